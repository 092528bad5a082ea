//! # Communication Layer Adapter
//!
//! The scheduler core does not implement networking. It consumes a
//! [`Transport`] that provides:
//!
//! - ordered, reliable point-to-point delivery per node pair
//! - a stable identity for the local node
//! - elections that resolve to the same winner on every node
//! - group membership enumeration and named sequence counters
//! - a termination barrier
//!
//! Inbound messages are handed to a [`MessageHandler`] on a transport-owned
//! thread, concurrently with executor threads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Network endpoint of a node as known to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn random() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upcall interface invoked once per inbound message.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, source: NodeId, opcode: u8, payload: &[u8]);
}

/// Point-to-point messaging plus group primitives.
pub trait Transport: Send + Sync {
    /// Identity of the local node.
    fn identifier(&self) -> NodeId;

    /// Send one message. `false` means the message was not handed over and
    /// the caller decides whether to try elsewhere.
    fn send(&self, destination: &NodeId, opcode: u8, payload: &[u8]) -> bool;

    /// Take part in the election for `tag` and return the winner.
    fn elect(&self, tag: &str) -> NodeId;

    /// Winner of the election for `tag` without candidating, waiting up to
    /// `timeout` for one to exist.
    fn election_result(&self, tag: &str, timeout: Duration) -> Option<NodeId>;

    /// All nodes currently in the group, including the local one.
    fn list_nodes(&self) -> Vec<NodeId>;

    /// Next value of the cluster-wide counter `name`, starting at 0.
    fn sequence_number(&self, name: &str) -> i64;

    /// Start delivering inbound messages to `handler`.
    fn enable_upcalls(&self, handler: Arc<dyn MessageHandler>);

    /// Signal cluster-wide termination.
    fn terminate(&self);

    /// Wait for termination to be signalled; `false` on timeout.
    fn wait_until_terminated(&self, timeout: Duration) -> bool;

    /// Leave the group and stop delivering messages.
    fn end(&self);
}
