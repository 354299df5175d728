//! A module which contains the definition of a struct used to send to or receive from a UDP socket.
//! Unlike a role-homogeneous multicast-group transport, every node here is bound to its own
//! unicast endpoint: roles are not known until the bootstrap handshake assigns them, so there is no
//! static "the proposers" address to join ahead of time.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::net::{SocketAddr, UdpSocket};

use bincode::{deserialize, serialize};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::directory::Endpoint;
use crate::message::Message;

const MAX_DATAGRAM_SIZE: usize = 16384;

/// A struct which binds a UDP socket to a single node's own endpoint and can send to or receive
/// from it.
pub struct NetNode<T> {
    socket: UdpSocket,
    value: PhantomData<T>,
}

impl<T> NetNode<T>
where
    T: Serialize + DeserializeOwned + Clone + Debug,
{
    pub fn bind(own: &Endpoint) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(own.0)?;
        Ok(NetNode {
            socket,
            value: PhantomData,
        })
    }

    /// Sends `m` to `destination`. A send failure is transport loss (Error taxonomy item 1): logged
    /// and dropped, never a panic, since the protocol is already designed to tolerate it via quorum
    /// redundancy or back-off.
    pub fn send(&self, m: &Message<T>, destination: &Endpoint) {
        match serialize(m) {
            Ok(encoded) => {
                if let Err(e) = self.socket.send_to(&encoded, destination.0) {
                    warn!("could not send to {:?}: {}", destination, e);
                }
            }
            Err(e) => warn!("could not serialize outgoing message: {}", e),
        }
    }

    /// Blocks on the socket for the next datagram and attempts to parse it into a `Message<T>`.
    /// Returns `None` (after logging a warning) if the socket read failed or the datagram did not
    /// parse, per Error taxonomy item 4 ("unparsable message").
    pub fn recv(&self) -> Option<(Message<T>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (n, src) = match self.socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("socket read failed: {}", e);
                return None;
            }
        };
        match deserialize::<Message<T>>(&buf[..n]) {
            Ok(m) => Some((m, src)),
            Err(e) => {
                warn!("dropping unparsable datagram ({} bytes) from {:?}: {}", n, src, e);
                None
            }
        }
    }
}
