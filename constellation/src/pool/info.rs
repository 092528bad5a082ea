use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use constellation_api::NodeRank;

/// Versioned membership snapshot of one steal pool.
///
/// `timestamp` increases on every membership change made by the pool master.
/// Other nodes only ever replace their copy with a strictly newer one, which
/// makes the gossip idempotent and tolerant of reordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    tag: String,
    master: Option<NodeRank>,
    members: Vec<NodeRank>,
    timestamp: u64,
}

impl PoolInfo {
    /// A new pool owned by `master`, which is also its first member.
    pub fn new(tag: impl Into<String>, master: NodeRank) -> Self {
        Self {
            tag: tag.into(),
            master: Some(master),
            members: vec![master],
            timestamp: 1,
        }
    }

    /// A local stand-in for a pool whose real membership is not known yet.
    ///
    /// Any copy received from the master supersedes it.
    pub fn placeholder(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            master: None,
            members: Vec::new(),
            timestamp: 0,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn master(&self) -> Option<NodeRank> {
        self.master
    }

    pub fn members(&self) -> &[NodeRank] {
        &self.members
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_placeholder(&self) -> bool {
        self.master.is_none()
    }

    pub fn contains(&self, rank: NodeRank) -> bool {
        self.members.contains(&rank)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a member, bumping the timestamp. Returns `false` if already present.
    pub fn add_member(&mut self, rank: NodeRank) -> bool {
        if self.contains(rank) {
            return false;
        }
        self.members.push(rank);
        self.members.sort_unstable();
        self.timestamp += 1;
        true
    }

    /// Remove a member, bumping the timestamp. Returns `false` if absent.
    pub fn remove_member(&mut self, rank: NodeRank) -> bool {
        let before = self.members.len();
        self.members.retain(|&m| m != rank);
        if self.members.len() == before {
            return false;
        }
        self.timestamp += 1;
        true
    }

    /// Replace `self` with `incoming` if it is strictly newer.
    pub fn update(&mut self, incoming: PoolInfo) -> bool {
        if incoming.tag != self.tag || incoming.timestamp <= self.timestamp {
            return false;
        }
        *self = incoming;
        true
    }

    /// A uniformly chosen member other than `exclude`.
    pub fn random_member<R: Rng + ?Sized>(&self, rng: &mut R, exclude: NodeRank) -> Option<NodeRank> {
        let candidates: Vec<NodeRank> = self.members.iter().copied().filter(|&m| m != exclude).collect();
        candidates.choose(rng).copied()
    }
}

impl fmt::Display for PoolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pool {} (master {:?}, ts {}, members {:?})",
            self.tag, self.master, self.timestamp, self.members
        )
    }
}
