//! The single-decree Paxos state machines for Proposer, Acceptor and Learner. Field names and the
//! "handlers section / senders section" banner layout follow the teacher crate's
//! `multi_paxos::Proposer`/`Acceptor`/`Learner` closely; the per-instance `HashMap<usize,
//! ...State<T>>` there is flattened here to single-decree state, since this system decides exactly
//! one decree per run (no multi-decree log replication).

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::thread;
use std::time::Duration;

use log::{debug, info, log_enabled, trace, Level};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::directory::{Directory, Endpoint, NodeId};
use crate::dispatcher::Dispatcher;
use crate::message::{Accept, Ack, Fwd, Learn, Message, Nack, Proposal};

/// Strict majority of `n`: the smallest count that is more than half. Equivalent to the teacher
/// crate's `num_of_acceptors / 2 + 1` (floor division), which is the formula actually required for
/// correctness (e.g. a single acceptor needs exactly 1 report, not 2).
fn strict_majority(n: usize) -> usize {
    n / 2 + 1
}

/// A single proposer-side attempt at the one decree this run decides. Proposers may have several
/// of these in flight at once — e.g. two clients submitting to the same proposer before either
/// round resolves — each keyed by its own round-correlation id.
struct ProposerRound<T> {
    client_id: NodeId,
    value: T,
    n: u64,
    acked: HashSet<NodeId>,
    highest_accepted_number: Option<u64>,
    highest_accepted_value: Option<T>,
    confirmed: HashSet<NodeId>,
    proposed: bool,
}

/// The struct representing the proposer in the Paxos algorithm.
pub struct Proposer<T> {
    id: NodeId,
    acceptors: Vec<Endpoint>,
    majority_of_acceptors: usize,
    total_consensus: usize,
    // `None` until the first proposal attempt; a sentinel of `0` would be indistinguishable from
    // a real emitted number for the proposer whose id is 0.
    last_n: Option<u64>,
    rounds: HashMap<Uuid, ProposerRound<T>>,
    config: NodeConfig,
}

impl<T> Proposer<T>
where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq,
{
    pub fn new(id: NodeId, directory: &Directory, acceptors: Vec<Endpoint>, config: NodeConfig) -> Self {
        Proposer {
            id,
            majority_of_acceptors: strict_majority(acceptors.len()),
            total_consensus: directory.consensus_count(),
            acceptors,
            last_n: None,
            rounds: HashMap::new(),
            config,
        }
    }

    /// Initially equal to `id`; each later call increases by `total_consensus` (spec 3), keeping
    /// every proposer's sequence in its own residue class modulo `P+A+L`.
    fn next_proposal_number(&mut self) -> u64 {
        let n = match self.last_n {
            None => self.id as u64,
            Some(prev) => prev + self.total_consensus as u64,
        };
        self.last_n = Some(n);
        n
    }

    // Handlers

    /// Trigger: a client's value arrives. Always starts a fresh round, even if other rounds for
    /// this decree are already in flight.
    pub fn handle_fwd(&mut self, fwd: Fwd<T>, dispatcher: &Dispatcher<T>) {
        info!("[P={:?}] handling {:?}", self.id, fwd);
        self.prepare(fwd.client_id, fwd.value, dispatcher);
    }

    /// Phase 1b: on ACK from an acceptor.
    pub fn handle_ack(&mut self, ack: Ack<T>, dispatcher: &Dispatcher<T>) {
        let round_id = ack.round_id;
        let round = match self.rounds.get_mut(&round_id) {
            Some(r) if r.n == ack.n => r,
            _ => {
                debug!(
                    "[P={:?}] dropping ACK for unknown or stale round {:?}",
                    self.id, round_id
                );
                return;
            }
        };

        round.acked.insert(ack.sender);
        if let Some(n) = ack.accepted_number {
            if round.highest_accepted_number.map_or(true, |best| n > best) {
                round.highest_accepted_number = Some(n);
                round.highest_accepted_value = ack.accepted_value;
            }
        }

        if self.config.debug && log_enabled!(Level::Trace) {
            trace!(
                "[P={:?}] round {:?}: acked={:?}, highest_accepted_number={:?}",
                self.id, round_id, round.acked, round.highest_accepted_number
            );
        }

        if round.acked.len() < self.majority_of_acceptors || round.proposed {
            return;
        }

        info!("[P={:?}] majority of ACKs reached for round {:?}", self.id, round_id);
        round.proposed = true;

        let candidate = round.highest_accepted_value.unwrap_or(round.value);
        let n = round.n;

        let accept = Accept {
            n,
            round_id,
            value: candidate,
            sender: self.id,
            confirm: false,
        };
        for acceptor in &self.acceptors {
            dispatcher.send(&Message::Accept::<T>(accept), acceptor);
        }
    }

    /// Phase 2b: on ACCEPT-confirm from an acceptor.
    pub fn handle_accept_confirm(&mut self, accept: Accept<T>, dispatcher: &Dispatcher<T>) {
        debug_assert!(accept.confirm, "proposer should only see confirm replies");
        let round_id = accept.round_id;
        let done = {
            let round = match self.rounds.get_mut(&round_id) {
                Some(r) if r.n == accept.n => r,
                _ => {
                    debug!(
                        "[P={:?}] dropping ACCEPT-confirm for unknown or stale round {:?}",
                        self.id, round_id
                    );
                    return;
                }
            };
            round.confirmed.insert(accept.sender);
            if self.config.debug && log_enabled!(Level::Trace) {
                trace!(
                    "[P={:?}] round {:?}: confirmed={:?}",
                    self.id, round_id, round.confirmed
                );
            }
            round.confirmed.len() >= self.majority_of_acceptors
        };

        if done {
            info!(
                "[P={:?}] majority of ACCEPT-confirms reached for round {:?}; round discharged",
                self.id, round_id
            );
            self.rounds.remove(&round_id);
        }
        let _ = dispatcher;
    }

    /// On NACK, the round is abandoned. With back-off disabled (default) the round is simply
    /// dropped: the client may not receive a value from this proposer. With back-off enabled, the
    /// proposer waits a random bounded interval and re-enters Phase 1a with an advanced number.
    pub fn handle_nack(&mut self, nack: Nack, dispatcher: &Dispatcher<T>) {
        let round_id = nack.round_id;
        let round = match self.rounds.remove(&round_id) {
            Some(r) if r.n == nack.n => r,
            Some(r) => {
                // Stale NACK for an already-superseded attempt; nothing to re-insert.
                self.rounds.insert(round_id, r);
                return;
            }
            None => return,
        };

        if !self.config.backoff {
            info!(
                "[P={:?}] round {:?} NACKed (min_proposal={:?}); back-off disabled, dropping round",
                self.id, round_id, nack.min_proposal
            );
            return;
        }

        info!(
            "[P={:?}] round {:?} NACKed; back-off enabled, retrying after jitter",
            self.id, round_id
        );
        let wait_ms = rand::thread_rng().gen_range(10, 100);
        thread::sleep(Duration::from_millis(wait_ms));
        self.prepare(round.client_id, round.value, dispatcher);
    }

    // Senders

    /// Phase 1a: increase own proposal number, generate a fresh round id, send PROPOSAL to every
    /// acceptor.
    fn prepare(&mut self, client_id: NodeId, value: T, dispatcher: &Dispatcher<T>) {
        let n = self.next_proposal_number();
        let round_id = Uuid::new_v4();

        self.rounds.insert(
            round_id,
            ProposerRound {
                client_id,
                value,
                n,
                acked: HashSet::new(),
                highest_accepted_number: None,
                highest_accepted_value: None,
                confirmed: HashSet::new(),
                proposed: false,
            },
        );

        let proposal = Proposal {
            n,
            round_id,
            sender: self.id,
        };
        info!("[P={:?}] sending {:?}", self.id, proposal);
        for acceptor in &self.acceptors {
            dispatcher.send(&Message::Proposal::<T>(proposal), acceptor);
        }
    }
}

/// Per-acceptor state: a single decree, so there is exactly one `(minProposal, acceptedNumber,
/// acceptedValue)` triple, not one per instance.
struct AcceptorState<T> {
    min_proposal: Option<u64>,
    accepted_number: Option<u64>,
    accepted_value: Option<T>,
}

impl<T> Default for AcceptorState<T> {
    fn default() -> Self {
        AcceptorState {
            min_proposal: None,
            accepted_number: None,
            accepted_value: None,
        }
    }
}

/// The struct representing the acceptor in the Paxos algorithm.
pub struct Acceptor<T> {
    id: NodeId,
    state: AcceptorState<T>,
    directory_consensus: Vec<Endpoint>,
    learners: Vec<Endpoint>,
    config: NodeConfig,
}

impl<T> Acceptor<T>
where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq,
{
    pub fn new(id: NodeId, directory: &Directory, learners: Vec<Endpoint>, config: NodeConfig) -> Self {
        Acceptor {
            id,
            state: AcceptorState::default(),
            directory_consensus: directory.consensus_endpoints().to_vec(),
            learners,
            config,
        }
    }

    fn reply_to(&self, sender: NodeId) -> Endpoint {
        self.directory_consensus[sender]
    }

    // Handlers

    /// On PROPOSAL: promise if `minProposal` is none or `n` strictly exceeds it; else NACK.
    pub fn handle_proposal(&mut self, proposal: Proposal, dispatcher: &Dispatcher<T>) {
        info!("[A={:?}] handling {:?}", self.id, proposal);

        let promise = match self.state.min_proposal {
            None => true,
            Some(min) => proposal.n > min,
        };

        let destination = self.reply_to(proposal.sender);
        if promise {
            self.state.min_proposal = Some(proposal.n);
            let ack = Ack {
                n: proposal.n,
                round_id: proposal.round_id,
                accepted_number: self.state.accepted_number,
                accepted_value: self.state.accepted_value,
                sender: self.id,
            };
            dispatcher.send(&Message::Ack::<T>(ack), &destination);
        } else {
            let nack = Nack {
                n: proposal.n,
                round_id: proposal.round_id,
                min_proposal: self.state.min_proposal.unwrap(),
                sender: self.id,
            };
            dispatcher.send(&Message::Nack::<T>(nack), &destination);
        }

        if self.config.debug && log_enabled!(Level::Trace) {
            trace!(
                "[A={:?}] state after PROPOSAL: min_proposal={:?}, accepted_number={:?}, accepted_value={:?}",
                self.id, self.state.min_proposal, self.state.accepted_number, self.state.accepted_value
            );
        }
    }

    /// On ACCEPT (phase 2a, `confirm == false`): accept if `n >= minProposal` (or no promise yet);
    /// else NACK. An acceptor that has promised exactly `n` may still accept `n` (tie-break at the
    /// ACCEPT boundary is honored; only PROPOSAL requires strict inequality).
    pub fn handle_accept(&mut self, accept: Accept<T>, dispatcher: &Dispatcher<T>) {
        debug_assert!(!accept.confirm, "acceptor should only see phase-2a proposals");
        info!("[A={:?}] handling {:?}", self.id, accept);

        let ok = match self.state.min_proposal {
            None => true,
            Some(min) => accept.n >= min,
        };

        let destination = self.reply_to(accept.sender);
        if ok {
            self.state.min_proposal = Some(accept.n);
            self.state.accepted_number = Some(accept.n);
            self.state.accepted_value = Some(accept.value);

            let learn = Learn {
                n: accept.n,
                round_id: accept.round_id,
                value: accept.value,
                acceptor: self.id,
            };
            for learner in &self.learners {
                dispatcher.send(&Message::Learn::<T>(learn), learner);
            }

            let confirm = Accept {
                n: accept.n,
                round_id: accept.round_id,
                value: accept.value,
                sender: self.id,
                confirm: true,
            };
            dispatcher.send(&Message::Accept::<T>(confirm), &destination);
        } else {
            let nack = Nack {
                n: accept.n,
                round_id: accept.round_id,
                min_proposal: self.state.min_proposal.unwrap(),
                sender: self.id,
            };
            dispatcher.send(&Message::Nack::<T>(nack), &destination);
        }

        if self.config.debug && log_enabled!(Level::Trace) {
            trace!(
                "[A={:?}] state after ACCEPT: min_proposal={:?}, accepted_number={:?}, accepted_value={:?}",
                self.id, self.state.min_proposal, self.state.accepted_number, self.state.accepted_value
            );
        }
    }
}

/// The struct representing the learner in the Paxos algorithm.
pub struct Learner<T> {
    id: NodeId,
    majority_of_acceptors: usize,
    // n -> (value, distinct reporting acceptors)
    reports: HashMap<u64, (T, HashSet<NodeId>)>,
    chosen: bool,
    clients: Vec<Endpoint>,
    config: NodeConfig,
}

impl<T> Learner<T>
where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq,
{
    pub fn new(id: NodeId, directory: &Directory, config: NodeConfig) -> Self {
        Learner {
            id,
            majority_of_acceptors: strict_majority(directory.acceptors),
            reports: HashMap::new(),
            chosen: false,
            clients: directory.client_endpoints().to_vec(),
            config,
        }
    }

    /// On LEARN: record the reporting acceptor; on first reaching strict majority for this `(n,
    /// value)`, deliver FINAL to every client. Redundant reports after that are tolerated and
    /// logged, not suppressed.
    pub fn handle_learn(&mut self, learn: Learn<T>, dispatcher: &Dispatcher<T>) {
        info!("[L={:?}] handling {:?}", self.id, learn);

        let entry = self
            .reports
            .entry(learn.n)
            .or_insert_with(|| (learn.value, HashSet::new()));
        assert_eq!(
            entry.0, learn.value,
            "bug: two different values reported for the same proposal number"
        );
        entry.1.insert(learn.acceptor);

        if self.config.debug && log_enabled!(Level::Trace) {
            trace!(
                "[L={:?}] reports for n={:?}: {:?}",
                self.id, learn.n, entry.1
            );
        }

        if entry.1.len() < self.majority_of_acceptors {
            return;
        }

        if self.chosen {
            debug!(
                "[L={:?}] redundant LEARN majority for already-chosen value; delivering again anyway",
                self.id
            );
        } else {
            info!("[L={:?}] value chosen: {:?}", self.id, learn.value);
            self.chosen = true;
        }

        let final_msg = Message::Final::<T>(crate::message::Final {
            round_id: learn.round_id,
            value: learn.value,
        });
        for client in &self.clients {
            dispatcher.send(&final_msg, client);
        }
    }
}
