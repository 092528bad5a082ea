//! # Loopback Transport
//!
//! An in-process [`Transport`] connecting any number of nodes inside one
//! process. Each node gets a `flume` inbox and, once upcalls are enabled, a
//! delivery thread that drains it in FIFO order. Elections, counters and the
//! termination barrier are shared state guarded by mutexes and condvars.
//!
//! Used by the integration tests to run several nodes side by side, and
//! usable as a single-node transport.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, Sender};
use tracing::{debug, trace, warn};

use constellation_api::{MessageHandler, NodeId, Transport};

struct Delivery {
    source: NodeId,
    opcode: u8,
    payload: Vec<u8>,
}

#[derive(Default)]
struct Members {
    order: Vec<NodeId>,
    inboxes: HashMap<NodeId, Sender<Delivery>>,
}

#[derive(Default)]
struct NetworkState {
    members: RwLock<Members>,
    elections: Mutex<HashMap<String, NodeId>>,
    elected: Condvar,
    counters: Mutex<HashMap<String, i64>>,
    terminated: Mutex<bool>,
    terminated_cv: Condvar,
}

/// A group of in-process nodes.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<NetworkState>,
}

impl fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("nodes", &self.len())
            .finish()
    }
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Messages sent to it are buffered until it enables upcalls.
    pub fn join(&self) -> Arc<LoopbackTransport> {
        let identifier = NodeId::random();
        let (tx, rx) = flume::unbounded();
        {
            let mut members = self.state.members.write().unwrap();
            members.order.push(identifier);
            members.inboxes.insert(identifier, tx);
        }
        debug!(node = %identifier, "node joined loopback network");
        Arc::new(LoopbackTransport {
            identifier,
            state: Arc::clone(&self.state),
            inbox: Mutex::new(Some(rx)),
            delivery: Mutex::new(None),
            ended: AtomicBool::new(false),
        })
    }

    /// Number of nodes currently in the group.
    pub fn len(&self) -> usize {
        self.state.members.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One node's view of a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    identifier: NodeId,
    state: Arc<NetworkState>,
    inbox: Mutex<Option<Receiver<Delivery>>>,
    delivery: Mutex<Option<JoinHandle<()>>>,
    ended: AtomicBool,
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("identifier", &self.identifier)
            .field("upcalls", &self.delivery.lock().unwrap().is_some())
            .field("ended", &self.ended.load(Ordering::Relaxed))
            .finish()
    }
}

impl LoopbackTransport {
    fn delivery_thread_main(inbox: Receiver<Delivery>, handler: Arc<dyn MessageHandler>, node: NodeId) {
        // ends once the network drops this node's inbox sender
        while let Ok(delivery) = inbox.recv() {
            trace!(node = %node, source = %delivery.source, opcode = delivery.opcode, "delivering message");
            handler.on_message(delivery.source, delivery.opcode, &delivery.payload);
        }
        debug!(node = %node, "delivery thread stopped");
    }
}

impl Transport for LoopbackTransport {
    fn identifier(&self) -> NodeId {
        self.identifier
    }

    fn send(&self, destination: &NodeId, opcode: u8, payload: &[u8]) -> bool {
        if self.ended.load(Ordering::Acquire) {
            return false;
        }
        let members = self.state.members.read().unwrap();
        match members.inboxes.get(destination) {
            Some(inbox) => inbox
                .send(Delivery {
                    source: self.identifier,
                    opcode,
                    payload: payload.to_vec(),
                })
                .is_ok(),
            None => false,
        }
    }

    fn elect(&self, tag: &str) -> NodeId {
        let mut elections = self.state.elections.lock().unwrap();
        let winner = *elections.entry(tag.to_string()).or_insert(self.identifier);
        self.state.elected.notify_all();
        winner
    }

    fn election_result(&self, tag: &str, timeout: Duration) -> Option<NodeId> {
        let elections = self.state.elections.lock().unwrap();
        let (elections, _) = self
            .state
            .elected
            .wait_timeout_while(elections, timeout, |elections| !elections.contains_key(tag))
            .unwrap();
        elections.get(tag).copied()
    }

    fn list_nodes(&self) -> Vec<NodeId> {
        self.state.members.read().unwrap().order.clone()
    }

    fn sequence_number(&self, name: &str) -> i64 {
        let mut counters = self.state.counters.lock().unwrap();
        let counter = counters.entry(name.to_string()).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }

    fn enable_upcalls(&self, handler: Arc<dyn MessageHandler>) {
        let Some(inbox) = self.inbox.lock().unwrap().take() else {
            warn!(node = %self.identifier, "upcalls already enabled");
            return;
        };
        let node = self.identifier;
        let spawned = std::thread::Builder::new()
            .name(format!("loopback-delivery-{}", node))
            .spawn(move || Self::delivery_thread_main(inbox, handler, node));
        match spawned {
            Ok(handle) => *self.delivery.lock().unwrap() = Some(handle),
            Err(e) => warn!(node = %node, error = %e, "failed to spawn delivery thread"),
        }
    }

    fn terminate(&self) {
        *self.state.terminated.lock().unwrap() = true;
        self.state.terminated_cv.notify_all();
    }

    fn wait_until_terminated(&self, timeout: Duration) -> bool {
        let terminated = self.state.terminated.lock().unwrap();
        let (terminated, _) = self
            .state
            .terminated_cv
            .wait_timeout_while(terminated, timeout, |terminated| !*terminated)
            .unwrap();
        *terminated
    }

    fn end(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut members = self.state.members.write().unwrap();
            members.order.retain(|node| *node != self.identifier);
            members.inboxes.remove(&self.identifier);
        }
        if let Some(handle) = self.delivery.lock().unwrap().take() {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                warn!(node = %self.identifier, "delivery thread panicked");
            }
        }
        debug!(node = %self.identifier, "left loopback network");
    }
}
