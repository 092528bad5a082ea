use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use rand::Rng;
use tracing::debug;

use constellation_api::NodeRank;

use super::info::PoolInfo;

/// Local copies of every pool this node owns or follows.
///
/// The map is guarded by an `RwLock`; each pool by its own `Mutex`, so
/// gossip for one pool never blocks steals aimed at another.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<String, Arc<Mutex<PoolInfo>>>>,
    /// Registrations that arrived before this node finished creating the
    /// pool it was elected master of.
    early: Mutex<HashMap<String, Vec<NodeRank>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self, tag: &str) -> Option<Arc<Mutex<PoolInfo>>> {
        self.pools.read().unwrap().get(tag).cloned()
    }

    /// Create a pool mastered by `master`, absorbing early registrations.
    pub fn create(&self, tag: &str, master: NodeRank) -> PoolInfo {
        let mut info = PoolInfo::new(tag, master);
        if let Some(ranks) = self.early.lock().unwrap().remove(tag) {
            debug!(pool = tag, count = ranks.len(), "assimilating early pool registrations");
            for rank in ranks {
                info.add_member(rank);
            }
        }
        let snapshot = info.clone();
        self.pools
            .write()
            .unwrap()
            .insert(tag.to_string(), Arc::new(Mutex::new(info)));
        snapshot
    }

    /// Track a pool owned elsewhere. Returns `false` if it is already known.
    pub fn follow(&self, tag: &str) -> bool {
        let mut pools = self.pools.write().unwrap();
        if pools.contains_key(tag) {
            return false;
        }
        pools.insert(tag.to_string(), Arc::new(Mutex::new(PoolInfo::placeholder(tag))));
        true
    }

    /// Add `rank` to a pool this node masters.
    ///
    /// Returns the new snapshot, or `None` when the pool does not exist yet
    /// and the registration was kept for [`create`](Self::create).
    pub fn register(&self, tag: &str, rank: NodeRank) -> Option<PoolInfo> {
        match self.pool(tag) {
            Some(pool) => {
                let mut info = pool.lock().unwrap();
                if info.is_placeholder() {
                    drop(info);
                    self.defer(tag, rank);
                    return None;
                }
                info.add_member(rank);
                Some(info.clone())
            }
            None => {
                self.defer(tag, rank);
                None
            }
        }
    }

    fn defer(&self, tag: &str, rank: NodeRank) {
        let mut early = self.early.lock().unwrap();
        let ranks = early.entry(tag.to_string()).or_default();
        if !ranks.contains(&rank) {
            ranks.push(rank);
        }
    }

    /// Commit a copy received from the pool master if it is strictly newer.
    pub fn update(&self, incoming: PoolInfo) -> bool {
        match self.pool(incoming.tag()) {
            Some(pool) => pool.lock().unwrap().update(incoming),
            None => false,
        }
    }

    /// The local copy, if it is newer than `timestamp` and owned here.
    pub fn newer_than(&self, tag: &str, timestamp: u64) -> Option<PoolInfo> {
        let pool = self.pool(tag)?;
        let info = pool.lock().unwrap();
        (!info.is_placeholder() && info.timestamp() > timestamp).then(|| info.clone())
    }

    pub fn snapshot(&self, tag: &str) -> Option<PoolInfo> {
        self.pool(tag).map(|pool| pool.lock().unwrap().clone())
    }

    /// Timestamp of the local copy, 0 for unknown pools.
    pub fn timestamp(&self, tag: &str) -> u64 {
        self.pool(tag)
            .map(|pool| pool.lock().unwrap().timestamp())
            .unwrap_or(0)
    }

    pub fn random_member<R: Rng + ?Sized>(&self, tag: &str, rng: &mut R, exclude: NodeRank) -> Option<NodeRank> {
        let pool = self.pool(tag)?;
        let info = pool.lock().unwrap();
        info.random_member(rng, exclude)
    }

    pub fn tags(&self) -> Vec<String> {
        self.pools.read().unwrap().keys().cloned().collect()
    }
}
