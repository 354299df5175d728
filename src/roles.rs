//! Role assignment: once Chang-Roberts (`crate::election`) elects a leader, the leader partitions
//! the consensus identifier space into proposer, acceptor and learner ranges, in ascending id
//! order, and broadcasts the assignment plus a readiness signal.

use log::info;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::directory::{Directory, Endpoint, NodeId};
use crate::dispatcher::Dispatcher;
use crate::message::{Assign, Message, Start};

/// The consensus role a node is assigned at bootstrap. (`Client` is not a consensus role and is
/// never carried on an `Assign` message; it is implicit in a node's dense id being `>= P+A+L`.)
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Proposer,
    Acceptor,
    Learner,
}

/// The partition of `[0, P+A+L)` into proposer/acceptor/learner id ranges, in ascending id order.
/// The leader, being the last id, always falls in the learner range.
pub struct Partition {
    pub proposers: Vec<NodeId>,
    pub acceptors: Vec<NodeId>,
    pub learners: Vec<NodeId>,
}

impl Partition {
    pub fn compute(directory: &Directory) -> Partition {
        let p = directory.proposers;
        let a = directory.acceptors;
        let proposers: Vec<NodeId> = (0..p).collect();
        let acceptors: Vec<NodeId> = (p..p + a).collect();
        let learners: Vec<NodeId> = (p + a..directory.consensus_count()).collect();
        Partition {
            proposers,
            acceptors,
            learners,
        }
    }

    pub fn role_of(&self, id: NodeId) -> Role {
        if self.proposers.contains(&id) {
            Role::Proposer
        } else if self.acceptors.contains(&id) {
            Role::Acceptor
        } else {
            Role::Learner
        }
    }

    fn endpoints(&self, ids: &[NodeId], directory: &Directory) -> Vec<Endpoint> {
        ids.iter().map(|&id| directory.consensus_endpoint(id)).collect()
    }
}

/// Runs on the leader only. Computes the partition, unicasts each consensus node its `Assign`
/// message (including the leader itself, which loops its own `Assign` back through its own
/// socket), then broadcasts `Start` to every consensus node.
pub fn assign_roles<T>(dispatcher: &Dispatcher<T>, directory: &Directory, leader_id: NodeId)
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    let partition = Partition::compute(directory);
    let proposer_endpoints = partition.endpoints(&partition.proposers, directory);
    let acceptor_endpoints = partition.endpoints(&partition.acceptors, directory);
    let learner_endpoints = partition.endpoints(&partition.learners, directory);

    for id in 0..directory.consensus_count() {
        let assign = Assign {
            recipient: id,
            role: partition.role_of(id),
            proposers: proposer_endpoints.clone(),
            acceptors: acceptor_endpoints.clone(),
            learners: learner_endpoints.clone(),
        };
        info!(
            "[leader={:?}] assigning node {:?} role {:?}",
            leader_id, id, assign.role
        );
        dispatcher.send(&Message::Assign::<T>(assign), &directory.consensus_endpoint(id));
    }

    let start = Start {
        proposers: proposer_endpoints,
    };
    for endpoint in directory.consensus_endpoints() {
        dispatcher.send(&Message::Start::<T>(start.clone()), endpoint);
    }
    info!("[leader={:?}] broadcast START to all consensus nodes", leader_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;

    fn directory(p: usize, a: usize, l: usize) -> Directory {
        let mut s = format!("PROPOSERS {}\nACCEPTORS {}\nLEARNERS  {}\n", p, a, l);
        for i in 0..(p + a + l) {
            s.push_str(&format!("127.0.0.1 {} con\n", 20000 + i));
        }
        s.push_str("127.0.0.1 29999 cli\n");
        Directory::parse(&s).unwrap()
    }

    #[test]
    fn partitions_in_ascending_id_order() {
        let dir = directory(1, 1, 1);
        let partition = Partition::compute(&dir);
        assert_eq!(partition.proposers, vec![0]);
        assert_eq!(partition.acceptors, vec![1]);
        assert_eq!(partition.learners, vec![2]);
    }

    #[test]
    fn leader_is_always_a_learner() {
        let dir = directory(3, 3, 3);
        let partition = Partition::compute(&dir);
        assert_eq!(partition.role_of(dir.leader_id()), Role::Learner);
    }

    #[test]
    fn role_sizes_sum_to_consensus_count() {
        let dir = directory(3, 5, 2);
        let partition = Partition::compute(&dir);
        assert_eq!(
            partition.proposers.len() + partition.acceptors.len() + partition.learners.len(),
            dir.consensus_count()
        );
    }
}
