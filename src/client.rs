//! The client side of the protocol (spec 4.7): `Initialize` discovers a proposer to talk to,
//! `Set` submits a value and blocks for the learner's delivery, `Cleanup` tears the cluster down.
//! Grounded on the teacher crate's `multi_paxos::Client` (same `NetNode`-backed unicast send), bent
//! from the teacher's repeated/interactive `request(value)` calls to the spec's single blocking
//! `set(value) -> T` call plus the bootstrap `Initialize`/`Cleanup` pair the spec's client needs
//! but the teacher's always-already-configured client does not.

use std::fmt::Debug;

use log::{debug, info, log_enabled, trace, Level};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::NodeConfig;
use crate::directory::{Directory, Endpoint, NodeId};
use crate::dispatcher::Dispatcher;
use crate::message::{Fwd, Message, Terminate};

/// A single client process. Owns its own dispatcher (bound to its own endpoint from the
/// directory) and blocks on it twice over its lifetime: once in `initialize`, once in `set`.
pub struct Client<T> {
    id: NodeId,
    directory: Directory,
    desired_proposer_index: usize,
    dispatcher: Dispatcher<T>,
    proposer: Option<Endpoint>,
    config: NodeConfig,
}

impl<T> Client<T>
where
    T: Serialize + DeserializeOwned + Copy + Clone + Debug + PartialEq + Send + 'static,
{
    pub fn new(
        id: NodeId,
        directory: Directory,
        desired_proposer_index: usize,
        own_endpoint: &Endpoint,
        config: NodeConfig,
    ) -> std::io::Result<Self> {
        let dispatcher = Dispatcher::spawn(own_endpoint, config)?;
        Ok(Client {
            id,
            directory,
            desired_proposer_index,
            dispatcher,
            proposer: None,
            config,
        })
    }

    /// Blocks until some consensus node's `START`-reused proposer list arrives, then selects this
    /// client's proposer at `desiredProposerIndex mod |proposers|`.
    pub fn initialize(&mut self) {
        loop {
            match self.dispatcher.next() {
                Message::Start(start) => {
                    if start.proposers.is_empty() {
                        continue;
                    }
                    let idx = self.desired_proposer_index % start.proposers.len();
                    let chosen = start.proposers[idx];
                    if self.config.debug && log_enabled!(Level::Trace) {
                        trace!(
                            "[C={:?}] full proposer list {:?}, chose index {}",
                            self.id, start.proposers, idx
                        );
                    }
                    info!("[C={:?}] selected proposer {:?} (index {})", self.id, chosen, idx);
                    self.proposer = Some(chosen);
                    return;
                }
                other => {
                    debug!(
                        "[C={:?}] dropping message received before bootstrap completed: {:?}",
                        self.id, other
                    );
                }
            }
        }
    }

    /// Sends `FWD {clientId, value}` to the selected proposer, then blocks until a `FINAL` arrives
    /// from any learner, and returns its value. Panics if called before `initialize`.
    pub fn set(&self, value: T) -> T {
        let proposer = self
            .proposer
            .expect("Client::set called before Client::initialize");

        let fwd = Fwd {
            client_id: self.id,
            value,
        };
        info!("[C={:?}] sending {:?} to proposer {:?}", self.id, fwd, proposer);
        self.dispatcher.send(&Message::Fwd::<T>(fwd), &proposer);

        loop {
            match self.dispatcher.next() {
                Message::Final(final_msg) => {
                    info!("[C={:?}] received FINAL {:?}", self.id, final_msg);
                    return final_msg.value;
                }
                other => {
                    debug!("[C={:?}] dropping message while awaiting FINAL: {:?}", self.id, other);
                }
            }
        }
    }

    /// Broadcasts `TERMINATE` to every consensus endpoint.
    pub fn cleanup(&self) {
        for endpoint in self.directory.consensus_endpoints() {
            self.dispatcher.send(&Message::Terminate::<T>(Terminate), endpoint);
        }
        info!("[C={:?}] broadcast TERMINATE to all consensus nodes", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    use crate::message::Final;
    use uuid::Uuid;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), port))
    }

    fn directory(consensus_ports: &[u16], client_port: u16) -> Directory {
        let mut s = format!(
            "PROPOSERS {}\nACCEPTORS 0\nLEARNERS  0\n",
            consensus_ports.len()
        );
        for port in consensus_ports {
            s.push_str(&format!("127.0.0.1 {} con\n", port));
        }
        s.push_str(&format!("127.0.0.1 {} cli\n", client_port));
        Directory::parse(&s).unwrap()
    }

    #[test]
    fn selects_proposer_at_desired_index_modulo_count() {
        let consensus_ports = [21800u16, 21801];
        let client_port = 21802;
        let directory = directory(&consensus_ports, client_port);
        let consensus_dispatcher = Dispatcher::<i64>::spawn(&endpoint(consensus_ports[0]), NodeConfig::default()).unwrap();

        let mut client = Client::<i64>::new(3, directory, 3, &endpoint(client_port), NodeConfig::default()).unwrap();
        let proposers = vec![endpoint(consensus_ports[0]), endpoint(consensus_ports[1])];
        consensus_dispatcher.send(
            &Message::Start::<i64>(crate::message::Start {
                proposers: proposers.clone(),
            }),
            &endpoint(client_port),
        );

        client.initialize();
        assert_eq!(client.proposer, Some(proposers[3 % proposers.len()]));
    }

    #[test]
    fn set_blocks_until_final_and_returns_its_value() {
        let consensus_ports = [21810u16];
        let client_port = 21811;
        let directory = directory(&consensus_ports, client_port);
        let proposer_dispatcher = Dispatcher::<i64>::spawn(&endpoint(consensus_ports[0]), NodeConfig::default()).unwrap();

        let mut client = Client::<i64>::new(1, directory, 0, &endpoint(client_port), NodeConfig::default()).unwrap();
        client.proposer = Some(endpoint(consensus_ports[0]));

        let learner_dispatcher = Dispatcher::<i64>::spawn(&endpoint(21812), NodeConfig::default()).unwrap();
        let client_endpoint = endpoint(client_port);
        let delivered = std::thread::spawn(move || client.set(210));

        match proposer_dispatcher.next() {
            Message::Fwd(fwd) => assert_eq!(fwd.value, 210),
            other => panic!("expected FWD, got {:?}", other),
        }
        learner_dispatcher.send(
            &Message::Final::<i64>(Final {
                round_id: Uuid::new_v4(),
                value: 210,
            }),
            &client_endpoint,
        );

        assert_eq!(delivered.join().unwrap(), 210);
    }

    #[test]
    fn cleanup_broadcasts_terminate_to_every_consensus_node() {
        let consensus_ports = [21820u16, 21821];
        let client_port = 21822;
        let directory = directory(&consensus_ports, client_port);
        let d0 = Dispatcher::<i64>::spawn(&endpoint(consensus_ports[0]), NodeConfig::default()).unwrap();
        let d1 = Dispatcher::<i64>::spawn(&endpoint(consensus_ports[1]), NodeConfig::default()).unwrap();

        let client = Client::<i64>::new(2, directory, 0, &endpoint(client_port), NodeConfig::default()).unwrap();
        client.cleanup();

        assert!(matches!(d0.next(), Message::Terminate(_)));
        assert!(matches!(d1.next(), Message::Terminate(_)));
    }
}
