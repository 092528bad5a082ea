//! Steal strategies: the rank-selection policy applied when removing a match
//! from a work queue.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ConstellationError, ConstellationResult};

/// Rank-selection policy for a steal.
///
/// `Any`, `Smallest` and `Biggest` never filter; they only pick a position
/// in the rank-ordered queue. `Value` and `Range` also restrict which ranks
/// are acceptable at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StealStrategy {
    /// Whatever is cheapest to take (the tail of a sorted list).
    #[default]
    Any,
    /// The lowest rank available.
    Smallest,
    /// The highest rank available.
    Biggest,
    /// Only an activity with exactly this rank.
    Value(i64),
    /// The lowest-positioned activity with `lo <= rank <= hi`.
    Range(i64, i64),
}

impl StealStrategy {
    pub fn value(value: i64) -> Self {
        StealStrategy::Value(value)
    }

    /// Build a `Range` strategy, rejecting inverted bounds.
    pub fn range(lo: i64, hi: i64) -> ConstellationResult<Self> {
        if lo > hi {
            return Err(ConstellationError::InvalidStrategy(format!(
                "range start {} is greater than range end {}",
                lo, hi
            )));
        }
        Ok(StealStrategy::Range(lo, hi))
    }

    /// Whether an activity with `rank` may be taken under this strategy.
    pub fn accepts(&self, rank: i64) -> bool {
        match *self {
            StealStrategy::Any | StealStrategy::Smallest | StealStrategy::Biggest => true,
            StealStrategy::Value(v) => rank == v,
            StealStrategy::Range(lo, hi) => lo <= rank && rank <= hi,
        }
    }
}

impl fmt::Display for StealStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StealStrategy::Any => write!(f, "ANY"),
            StealStrategy::Smallest => write!(f, "SMALLEST"),
            StealStrategy::Biggest => write!(f, "BIGGEST"),
            StealStrategy::Value(v) => write!(f, "VALUE({})", v),
            StealStrategy::Range(lo, hi) => write!(f, "RANGE({}, {})", lo, hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(StealStrategy::range(5, 1).is_err());
        assert_eq!(StealStrategy::range(1, 1).unwrap(), StealStrategy::Range(1, 1));
    }

    #[test]
    fn test_accepts() {
        assert!(StealStrategy::Biggest.accepts(i64::MIN));
        assert!(StealStrategy::Value(3).accepts(3));
        assert!(!StealStrategy::Value(3).accepts(4));
        assert!(StealStrategy::Range(1, 4).accepts(4));
        assert!(!StealStrategy::Range(1, 4).accepts(5));
    }
}
