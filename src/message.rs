//! A module which contains the definition of the messages exchanged by nodes. The closed set of
//! `HEADER` tags is represented as an enum of variants, each carrying a header-specific payload
//! struct, exactly as the algorithm's wire format is described.

use uuid::Uuid;

use crate::directory::{Endpoint, NodeId};

/// An enum which contains all types of messages which nodes can exchange, over the election,
/// bootstrap and Paxos phases of a run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Message<T> {
    /// Chang-Roberts election token, carrying a candidate id around the ring.
    Elect(Elect),
    /// Chang-Roberts elected announcement, cycled once around the ring.
    Elected(Elected),
    /// Leader -> consensus node: role + topology assignment.
    Assign(Assign),
    /// Leader -> consensus nodes (bootstrap complete), and consensus node -> clients (proposer
    /// list). The one wire header is reused for both, per the closed header set.
    Start(Start),
    /// Client -> all consensus nodes: clean shutdown.
    Terminate(Terminate),
    /// Client -> proposer: a value to agree on.
    Fwd(Fwd<T>),
    /// Proposer -> acceptors: phase 1a prepare.
    Proposal(Proposal),
    /// Acceptor -> proposer: phase 1b promise.
    Ack(Ack<T>),
    /// Acceptor -> proposer: rejection of a PROPOSAL or ACCEPT.
    Nack(Nack),
    /// Proposer -> acceptors (phase 2a) and acceptor -> proposer (phase 2b confirm). Distinguished
    /// by the `confirm` field, per the closed header set.
    Accept(Accept<T>),
    /// Acceptor -> learners: notification of an accepted (n, v).
    Learn(Learn<T>),
    /// Learner -> client: the chosen value.
    Final(Final<T>),
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Elect {
    pub candidate: NodeId,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Elected {
    pub leader: NodeId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Assign {
    pub recipient: NodeId,
    pub role: crate::roles::Role,
    pub proposers: Vec<Endpoint>,
    pub acceptors: Vec<Endpoint>,
    pub learners: Vec<Endpoint>,
}

/// Sent leader -> consensus nodes to signal bootstrap is complete, and (reused) consensus node ->
/// clients carrying the proposer list clients need to pick a target.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Start {
    pub proposers: Vec<Endpoint>,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Terminate;

/// In phase 0, a client forwards a value to a proposer, which starts the Paxos round.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Fwd<T> {
    pub client_id: NodeId,
    pub value: T,
}

/// In phase 1a, n is sent from one proposer to all acceptors.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Proposal {
    pub n: u64,
    pub round_id: Uuid,
    pub sender: NodeId,
}

/// In phase 1b, an acceptor answers a Proposal with a promise, carrying its previously accepted
/// (number, value) pair if any.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Ack<T> {
    pub n: u64,
    pub round_id: Uuid,
    pub accepted_number: Option<u64>,
    pub accepted_value: Option<T>,
    pub sender: NodeId,
}

/// Rejection of a Proposal (phase 1a) or an Accept (phase 2a) whose number is not high enough.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Nack {
    pub n: u64,
    pub round_id: Uuid,
    pub min_proposal: u64,
    pub sender: NodeId,
}

/// In phase 2a, (n, value) is sent from one proposer to all acceptors (`confirm = false`); in phase
/// 2b, an acceptor confirms back to the proposer (`confirm = true`).
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Accept<T> {
    pub n: u64,
    pub round_id: Uuid,
    pub value: T,
    pub sender: NodeId,
    pub confirm: bool,
}

/// In phase 3, an acceptor notifies the learners of an accepted (n, value).
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Learn<T> {
    pub n: u64,
    pub round_id: Uuid,
    pub value: T,
    pub acceptor: NodeId,
}

/// A learner's delivery of the chosen value back to a client.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Final<T> {
    pub round_id: Uuid,
    pub value: T,
}
