//! Single-decree Paxos over a Chang-Roberts leader-elected cluster: a fixed set of processes reads
//! a shared host directory, elects a leader by ring token-passing, has the leader partition the
//! rest into proposer/acceptor/learner roles, and then runs the classic two-phase protocol to
//! agree on exactly one client-submitted value.

extern crate bincode;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate uuid;

pub mod client;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod election;
pub mod message;
pub mod net_node;
pub mod node;
pub mod paxos;
pub mod roles;

/// The type of value a client submits and a learner delivers back. The spec's worked scenarios
/// (section 8) only ever use plain integers (`210`, `55`, `230`, ...); `i64` is the simplest type
/// that is faithful to that and to the wire format's "value" field.
pub type Value = i64;
