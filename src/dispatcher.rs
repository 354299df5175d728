//! The per-node message dispatcher: a receiver thread that does nothing but read datagrams and
//! push parsed messages onto an in-memory queue, and a queue that the worker (whichever loop
//! currently owns this node's mutable state — election, role assignment, or Paxos) drains one
//! message at a time. The receiver never touches Paxos state; it is the sole producer onto the
//! queue, and the caller of `next` is the sole consumer.

use std::fmt::Debug;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use log::{log_enabled, trace, Level};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::NodeConfig;
use crate::directory::Endpoint;
use crate::message::Message;
use crate::net_node::NetNode;

/// Owns a node's socket (via `NetNode`) and the single-consumer queue fed by its receiver thread.
pub struct Dispatcher<T> {
    node: Arc<NetNode<T>>,
    queue: Receiver<Message<T>>,
    config: NodeConfig,
    // Kept alive for the dispatcher's lifetime; not joined on shutdown (see crate-level note on
    // TERMINATE: a blocking recv_from has no portable interrupt in std).
    _receiver_thread: JoinHandle<()>,
}

impl<T> Dispatcher<T>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    pub fn spawn(own: &Endpoint, config: NodeConfig) -> std::io::Result<Self> {
        let node = Arc::new(NetNode::bind(own)?);
        let (tx, rx) = mpsc::channel();

        let recv_node = Arc::clone(&node);
        let receiver_thread = thread::spawn(move || loop {
            if let Some((message, _src)) = recv_node.recv() {
                if tx.send(message).is_err() {
                    // The worker has gone away; nothing left to dispatch to.
                    break;
                }
            }
        });

        Ok(Dispatcher {
            node,
            queue: rx,
            config,
            _receiver_thread: receiver_thread,
        })
    }

    /// Sends `m` to `destination` via this node's own socket.
    pub fn send(&self, m: &Message<T>, destination: &Endpoint) {
        self.node.send(m, destination);
    }

    /// Blocks until the next message has been dispatched by the receiver thread. When `DEBUG` is
    /// set, every dispatched message is traced before being handed to the caller; gated on both the
    /// config flag and `log_enabled!` so the `{:?}` formatting of the message itself is never paid
    /// for when tracing is off, mirroring the teacher crate's `log_enabled!(Level::Info)` guard.
    pub fn next(&self) -> Message<T> {
        let m = self
            .queue
            .recv()
            .expect("receiver thread exited without dropping its sender");
        if self.config.debug && log_enabled!(Level::Trace) {
            trace!("dispatching {:?}", m);
        }
        m
    }
}
