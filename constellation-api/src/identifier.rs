//! Identifiers for nodes, executors and activities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical rank of a node in the cluster, distinct from a context rank.
pub type NodeRank = i32;

/// Identifies one executor: the node it lives on and its index there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstellationIdentifier {
    pub node: NodeRank,
    pub executor: u32,
}

impl ConstellationIdentifier {
    pub fn new(node: NodeRank, executor: u32) -> Self {
        Self { node, executor }
    }
}

impl fmt::Display for ConstellationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CID:{}:{}", self.node, self.executor)
    }
}

/// Globally unique name of a submitted activity, also its event address.
///
/// The origin is the executor (or node, for external submissions) that
/// created the activity; it does not change when the activity is stolen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityIdentifier {
    pub origin: ConstellationIdentifier,
    pub sequence: u64,
    pub expects_events: bool,
}

impl ActivityIdentifier {
    pub fn new(origin: ConstellationIdentifier, sequence: u64, expects_events: bool) -> Self {
        Self {
            origin,
            sequence,
            expects_events,
        }
    }

    /// Rank of the node that created the activity.
    pub fn node(&self) -> NodeRank {
        self.origin.node
    }
}

impl fmt::Display for ActivityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AID:{}:{}:{}", self.origin.node, self.origin.executor, self.sequence)
    }
}
