use std::collections::HashMap;
use std::sync::RwLock;

use constellation_api::{NodeId, NodeRank};

/// Maps node ranks to transport identities.
///
/// Entries are only ever added or overwritten; a node keeps its rank for the
/// lifetime of the cluster.
#[derive(Debug, Default)]
pub struct LocationCache {
    entries: RwLock<HashMap<NodeRank, NodeId>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rank: NodeRank) -> Option<NodeId> {
        self.entries.read().unwrap().get(&rank).copied()
    }

    /// Record a location. Returns `true` if it was not known before.
    pub fn insert(&self, rank: NodeRank, node: NodeId) -> bool {
        self.entries.write().unwrap().insert(rank, node) != Some(node)
    }

    /// Reverse lookup, used to name the sender of an inbound message.
    pub fn rank_of(&self, node: &NodeId) -> Option<NodeRank> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .find_map(|(rank, id)| (id == node).then_some(*rank))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let cache = LocationCache::new();
        let node = NodeId::random();
        assert!(cache.insert(3, node));
        assert!(!cache.insert(3, node));
        assert_eq!(cache.get(3), Some(node));
        assert_eq!(cache.rank_of(&node), Some(3));
        assert_eq!(cache.get(4), None);
    }
}
