//! Chang-Roberts leader election over the consensus ring. Every consensus node knows its ring
//! successor by dense id arithmetic (`next = (id + 1) mod (P+A+L)`, looked up in the static
//! directory), so no discovery is needed beyond the directory the process already parsed at
//! startup. See spec 4.2 / 9 ("the election ring is a logical overlay, not a data structure").

use std::fmt::Debug;

use log::{debug, info, log_enabled, trace, Level};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::NodeConfig;
use crate::directory::{Directory, NodeId};
use crate::dispatcher::Dispatcher;
use crate::message::{Elect, Elected, Message};

/// Runs Chang-Roberts to completion and returns the winning (maximum) consensus id. Blocks until
/// this node either becomes the leader or receives the `Elected` announcement.
pub fn run_election<T>(
    dispatcher: &Dispatcher<T>,
    directory: &Directory,
    own_id: NodeId,
    config: NodeConfig,
) -> NodeId
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    let successor = directory.consensus_endpoint(directory.ring_successor(own_id));

    dispatcher.send(&Message::Elect::<T>(Elect { candidate: own_id }), &successor);
    info!("[node={:?}] sent election token {:?} to successor", own_id, own_id);

    // Once this node has forwarded a candidate id greater than its own, it has conceded the
    // election and must no longer re-insert its own id for later, smaller tokens.
    let mut conceded = false;

    loop {
        match dispatcher.next() {
            Message::Elect(token) => {
                let v = token.candidate;
                if config.debug && log_enabled!(Level::Trace) {
                    trace!(
                        "[node={:?}] received election token {:?} (conceded={:?})",
                        own_id, v, conceded
                    );
                }
                if v == own_id {
                    info!("[node={:?}] is the elected leader", own_id);
                    let elected = Elected { leader: own_id };
                    dispatcher.send(&Message::Elected::<T>(elected), &successor);
                    return own_id;
                } else if v > own_id {
                    conceded = true;
                    dispatcher.send(&Message::Elect::<T>(Elect { candidate: v }), &successor);
                } else if !conceded {
                    dispatcher.send(&Message::Elect::<T>(Elect { candidate: own_id }), &successor);
                } else {
                    debug!(
                        "[node={:?}] dropping stale election token {:?} (already conceded)",
                        own_id, v
                    );
                }
            }
            Message::Elected(elected) => {
                if elected.leader != own_id {
                    dispatcher.send(&Message::Elected::<T>(elected), &successor);
                }
                info!("[node={:?}] learned leader is {:?}", own_id, elected.leader);
                return elected.leader;
            }
            other => {
                debug!(
                    "[node={:?}] dropping out-of-state message during election: {:?}",
                    own_id, other
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::sync::Arc;
    use std::thread;

    use crate::directory::Endpoint;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), port))
    }

    fn ring_directory(n: usize, base_port: u16) -> (Directory, Vec<u16>) {
        let mut s = format!("PROPOSERS {}\nACCEPTORS 0\nLEARNERS  0\n", n);
        let ports: Vec<u16> = (0..n).map(|i| base_port + i as u16).collect();
        for port in &ports {
            s.push_str(&format!("127.0.0.1 {} con\n", port));
        }
        s.push_str(&format!("127.0.0.1 {} cli\n", base_port + n as u16));
        (Directory::parse(&s).unwrap(), ports)
    }

    #[test]
    fn elects_the_maximum_consensus_id_regardless_of_starting_node() {
        let (directory, ports) = ring_directory(5, 21000);
        let directory = Arc::new(directory);

        // Bind every node's socket before any of them starts sending election tokens, so no send
        // races a not-yet-listening peer.
        let dispatchers: Vec<Dispatcher<i64>> = ports
            .iter()
            .map(|&p| Dispatcher::spawn(&endpoint(p), NodeConfig::default()).unwrap())
            .collect();

        let handles: Vec<_> = dispatchers
            .into_iter()
            .enumerate()
            .map(|(id, dispatcher)| {
                let directory = Arc::clone(&directory);
                thread::spawn(move || run_election(&dispatcher, &directory, id, NodeConfig::default()))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 4, "leader must be the maximum consensus id");
        }
    }

    #[test]
    fn single_node_ring_elects_itself() {
        let (directory, ports) = ring_directory(1, 21050);
        let dispatcher = Dispatcher::<i64>::spawn(&endpoint(ports[0]), NodeConfig::default()).unwrap();
        assert_eq!(run_election(&dispatcher, &directory, 0, NodeConfig::default()), 0);
    }
}
