//! The `condriver` process body: runs a consensus node's full lifecycle end to end — Chang-Roberts
//! election, the leader's role assignment and readiness broadcast, then the steady-state Paxos
//! dispatch loop for whichever role this node was assigned — over the single dispatcher the
//! concurrency model (spec 5) calls for. Kept out of `src/bin/condriver.rs` so that binary can stay
//! as thin as the teacher crate's `examples/start_*.rs` scripts.

use std::fmt::Debug;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::NodeConfig;
use crate::directory::{Directory, Endpoint, NodeId};
use crate::dispatcher::Dispatcher;
use crate::election;
use crate::message::{Assign, Message, Start};
use crate::paxos::{Acceptor, Learner, Proposer};
use crate::roles::{self, Role};

/// Runs this consensus node to completion: blocks until a `TERMINATE` is received. Returns once
/// the node has shut down cleanly (error taxonomy item 6).
pub fn run<T>(own_id: NodeId, directory: Directory, config: NodeConfig) -> std::io::Result<()>
where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq + Send + 'static,
{
    let own_endpoint = directory.consensus_endpoint(own_id);
    let dispatcher = Dispatcher::<T>::spawn(&own_endpoint, config)?;

    let leader_id = election::run_election(&dispatcher, &directory, own_id, config);

    if own_id == leader_id {
        roles::assign_roles(&dispatcher, &directory, leader_id);
    }

    let assign = await_assign(&dispatcher, own_id);
    info!("[node={:?}] assigned role {:?}", own_id, assign.role);

    await_start(&dispatcher, own_id);
    for client in directory.client_endpoints() {
        dispatcher.send(
            &Message::Start::<T>(Start {
                proposers: assign.proposers.clone(),
            }),
            client,
        );
    }
    info!(
        "[node={:?}] bootstrap complete; entering Paxos dispatch loop as {:?}",
        own_id, assign.role
    );

    match assign.role {
        Role::Proposer => run_proposer(own_id, &directory, assign.acceptors, config, &dispatcher),
        Role::Acceptor => run_acceptor(own_id, &directory, assign.learners, config, &dispatcher),
        Role::Learner => run_learner(own_id, &directory, config, &dispatcher),
    }

    Ok(())
}

/// Blocks until this node's own unicast `ASSIGN` arrives, dropping anything else (e.g. stray
/// election tokens still circulating from a concurrently-resolving neighbor) per error taxonomy
/// item 3 ("out-of-state message").
fn await_assign<T>(dispatcher: &Dispatcher<T>, own_id: NodeId) -> Assign
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    loop {
        match dispatcher.next() {
            Message::Assign(assign) if assign.recipient == own_id => return assign,
            other => {
                debug!(
                    "[node={:?}] dropping message received before role assignment: {:?}",
                    own_id, other
                );
            }
        }
    }
}

/// Blocks until the leader's `START` broadcast arrives.
fn await_start<T>(dispatcher: &Dispatcher<T>, own_id: NodeId)
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    loop {
        match dispatcher.next() {
            Message::Start(_) => return,
            other => {
                debug!(
                    "[node={:?}] dropping message received before START: {:?}",
                    own_id, other
                );
            }
        }
    }
}

fn run_proposer<T>(
    id: NodeId,
    directory: &Directory,
    acceptors: Vec<Endpoint>,
    config: NodeConfig,
    dispatcher: &Dispatcher<T>,
) where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq,
{
    let mut proposer = Proposer::new(id, directory, acceptors, config);
    loop {
        match dispatcher.next() {
            Message::Fwd(fwd) => proposer.handle_fwd(fwd, dispatcher),
            Message::Ack(ack) => proposer.handle_ack(ack, dispatcher),
            Message::Accept(accept) if accept.confirm => {
                proposer.handle_accept_confirm(accept, dispatcher)
            }
            Message::Nack(nack) => proposer.handle_nack(nack, dispatcher),
            Message::Terminate(_) => {
                info!("[P={:?}] received TERMINATE; shutting down", id);
                return;
            }
            other => debug!("[P={:?}] dropping unexpected message: {:?}", id, other),
        }
    }
}

fn run_acceptor<T>(
    id: NodeId,
    directory: &Directory,
    learners: Vec<Endpoint>,
    config: NodeConfig,
    dispatcher: &Dispatcher<T>,
) where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq,
{
    let mut acceptor = Acceptor::new(id, directory, learners, config);
    loop {
        match dispatcher.next() {
            Message::Proposal(proposal) => acceptor.handle_proposal(proposal, dispatcher),
            Message::Accept(accept) if !accept.confirm => acceptor.handle_accept(accept, dispatcher),
            Message::Terminate(_) => {
                info!("[A={:?}] received TERMINATE; shutting down", id);
                return;
            }
            other => debug!("[A={:?}] dropping unexpected message: {:?}", id, other),
        }
    }
}

fn run_learner<T>(id: NodeId, directory: &Directory, config: NodeConfig, dispatcher: &Dispatcher<T>)
where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq,
{
    let mut learner = Learner::new(id, directory, config);
    loop {
        match dispatcher.next() {
            Message::Learn(learn) => learner.handle_learn(learn, dispatcher),
            Message::Terminate(_) => {
                info!("[L={:?}] received TERMINATE; shutting down", id);
                return;
            }
            other => debug!("[L={:?}] dropping unexpected message: {:?}", id, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use crate::client::Client;

    /// `P=A=L=1` plus one client, on consecutive loopback ports starting at `base_port`: the
    /// minimal end-to-end scenario (spec 8, scenario 1).
    fn minimal_directory(base_port: u16) -> Directory {
        let s = format!(
            "PROPOSERS 1\nACCEPTORS 1\nLEARNERS  1\n\
             127.0.0.1 {} con\n127.0.0.1 {} con\n127.0.0.1 {} con\n127.0.0.1 {} cli\n",
            base_port,
            base_port + 1,
            base_port + 2,
            base_port + 3,
        );
        Directory::parse(&s).unwrap()
    }

    #[test]
    fn full_pipeline_delivers_clients_submitted_value() {
        let directory = Arc::new(minimal_directory(22000));
        let config = NodeConfig::default();

        let node_handles: Vec<_> = (0..directory.consensus_count())
            .map(|id| {
                let directory = Arc::clone(&directory);
                thread::spawn(move || run::<i64>(id, (*directory).clone(), config).unwrap())
            })
            .collect();

        let client_id = directory.consensus_count();
        let client_endpoint = directory.client_endpoint(client_id);
        let mut client =
            Client::<i64>::new(client_id, (*directory).clone(), 0, &client_endpoint, config).unwrap();

        client.initialize();
        let delivered = client.set(210);
        assert_eq!(delivered, 210, "client must receive the value it submitted");
        client.cleanup();

        for handle in node_handles {
            handle.join().unwrap();
        }
    }
}
