use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use constellation_api::NodeRank;

/// Nanoseconds since the Unix epoch on the local clock.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Clock offsets of peers measured at activation.
///
/// Only used for reporting; scheduling never depends on peer clocks.
#[derive(Debug, Default)]
pub struct TimeSync {
    offsets: RwLock<HashMap<NodeRank, i64>>,
}

impl TimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request/reply exchange and return the computed offset.
    ///
    /// `offset = sent + rtt / 2 - remote`, so adding it to a remote timestamp
    /// yields the local time.
    pub fn record(&self, rank: NodeRank, sent: i64, received: i64, remote: i64) -> i64 {
        let rtt = received - sent;
        let offset = sent + rtt / 2 - remote;
        self.offsets.write().unwrap().insert(rank, offset);
        offset
    }

    pub fn offset(&self, rank: NodeRank) -> Option<i64> {
        self.offsets.read().unwrap().get(&rank).copied()
    }

    pub fn offsets(&self) -> HashMap<NodeRank, i64> {
        self.offsets.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_uses_half_round_trip() {
        let sync = TimeSync::new();
        // sent at 1000, reply at 1100, remote clock read 400 halfway through
        assert_eq!(sync.record(1, 1_000, 1_100, 400), 650);
        assert_eq!(sync.offset(1), Some(650));
        assert_eq!(sync.offset(2), None);
    }
}
