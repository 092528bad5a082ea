//! # Context Model
//!
//! Contexts decide which executor may run which activity. An activity
//! declares an [`ActivityContext`]; an executor declares an
//! [`ExecutorContext`]. Both are sum types with a `Unit` variant (a single
//! tag) and an `Or` variant (a set of at least two unit members).
//!
//! ## Matching
//!
//! A unit activity context `(tag, rank)` is satisfied by a unit executor
//! context with the same tag, provided the steal strategy accepts `rank`.
//! `Or` contexts on either side match when any member pair matches. An
//! absent executor context never matches.
//!
//! ## Identity
//!
//! A unit activity context hashes by tag only, while equality also compares
//! the rank. Unordered `Or` contexts are canonicalized at construction so
//! that permutations of the same members compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::errors::{ConstellationError, ConstellationResult};
use crate::strategy::StealStrategy;

/// Tag of the context used when none is configured.
pub const DEFAULT_TAG: &str = "DEFAULT";

/// Stable hash of a tag, used to canonicalize unordered member sets.
///
/// FNV-1a 64, so every node and every build orders members the same way.
pub fn tag_hash(tag: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    tag.bytes()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

fn check_tag(tag: &str) -> ConstellationResult<()> {
    if tag.is_empty() {
        return Err(ConstellationError::InvalidContext(
            "context tag must not be empty".to_string(),
        ));
    }
    Ok(())
}

// Wire shapes of the contexts. Decoding goes through the constructors so
// contexts from other nodes obey the same rules as local ones.

#[derive(Deserialize)]
struct RawUnitActivityContext {
    tag: String,
    rank: i64,
}

#[derive(Deserialize)]
struct RawOrActivityContext {
    members: Vec<UnitActivityContext>,
    ordered: bool,
}

#[derive(Deserialize)]
struct RawUnitExecutorContext {
    tag: String,
}

#[derive(Deserialize)]
struct RawOrExecutorContext {
    members: Vec<UnitExecutorContext>,
    ordered: bool,
}

impl TryFrom<RawUnitActivityContext> for UnitActivityContext {
    type Error = ConstellationError;

    fn try_from(raw: RawUnitActivityContext) -> ConstellationResult<Self> {
        Self::new(raw.tag, raw.rank)
    }
}

impl TryFrom<RawOrActivityContext> for OrActivityContext {
    type Error = ConstellationError;

    fn try_from(raw: RawOrActivityContext) -> ConstellationResult<Self> {
        Self::new(raw.members, raw.ordered)
    }
}

impl TryFrom<RawUnitExecutorContext> for UnitExecutorContext {
    type Error = ConstellationError;

    fn try_from(raw: RawUnitExecutorContext) -> ConstellationResult<Self> {
        Self::new(raw.tag)
    }
}

impl TryFrom<RawOrExecutorContext> for OrExecutorContext {
    type Error = ConstellationError;

    fn try_from(raw: RawOrExecutorContext) -> ConstellationResult<Self> {
        Self::new(raw.members, raw.ordered)
    }
}

/// A single `(tag, rank)` classifier for an activity.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUnitActivityContext")]
pub struct UnitActivityContext {
    tag: String,
    rank: i64,
}

impl UnitActivityContext {
    pub fn new(tag: impl Into<String>, rank: i64) -> ConstellationResult<Self> {
        let tag = tag.into();
        check_tag(&tag)?;
        Ok(Self { tag, rank })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rank(&self) -> i64 {
        self.rank
    }

    /// Whether this member alone is satisfied by a unit executor tag.
    pub fn satisfied_by_tag(&self, executor_tag: &str, strategy: &StealStrategy) -> bool {
        self.tag == executor_tag && strategy.accepts(self.rank)
    }

    fn sort_key(&self) -> (u64, i64, &str) {
        (tag_hash(&self.tag), self.rank, &self.tag)
    }
}

impl PartialEq for UnitActivityContext {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.rank == other.rank
    }
}

impl Hash for UnitActivityContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag.hash(state);
    }
}

impl fmt::Display for UnitActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.rank)
    }
}

/// A set of unit activity contexts; the activity may run on any of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawOrActivityContext")]
pub struct OrActivityContext {
    members: Vec<UnitActivityContext>,
    ordered: bool,
}

impl OrActivityContext {
    /// Build an `Or` context from at least two members.
    ///
    /// With `ordered == false` the members are sorted by tag hash, then
    /// rank, so that every permutation yields the same context.
    pub fn new(mut members: Vec<UnitActivityContext>, ordered: bool) -> ConstellationResult<Self> {
        if members.len() < 2 {
            return Err(ConstellationError::InvalidContext(format!(
                "an Or context needs at least 2 members, got {}",
                members.len()
            )));
        }
        if !ordered {
            members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        Ok(Self { members, ordered })
    }

    pub fn members(&self) -> &[UnitActivityContext] {
        &self.members
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }
}

/// The context an activity declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityContext {
    Unit(UnitActivityContext),
    Or(OrActivityContext),
}

impl ActivityContext {
    pub fn unit(tag: impl Into<String>, rank: i64) -> ConstellationResult<Self> {
        Ok(ActivityContext::Unit(UnitActivityContext::new(tag, rank)?))
    }

    pub fn or(members: Vec<UnitActivityContext>, ordered: bool) -> ConstellationResult<Self> {
        Ok(ActivityContext::Or(OrActivityContext::new(members, ordered)?))
    }

    /// The unit members of this context, one for a `Unit` context.
    pub fn units(&self) -> &[UnitActivityContext] {
        match self {
            ActivityContext::Unit(unit) => std::slice::from_ref(unit),
            ActivityContext::Or(or) => or.members(),
        }
    }

    pub fn is_or(&self) -> bool {
        matches!(self, ActivityContext::Or(_))
    }

    /// Pure matching predicate between an activity and an executor.
    pub fn satisfied_by(&self, executor: Option<&ExecutorContext>, strategy: &StealStrategy) -> bool {
        let Some(executor) = executor else {
            return false;
        };
        self.units().iter().any(|unit| {
            executor
                .units()
                .iter()
                .any(|e| unit.satisfied_by_tag(e.tag(), strategy))
        })
    }
}

impl fmt::Display for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityContext::Unit(unit) => write!(f, "{}", unit),
            ActivityContext::Or(or) => {
                let members: Vec<String> = or.members().iter().map(|m| m.to_string()).collect();
                write!(f, "OR({})", members.join(", "))
            }
        }
    }
}

/// A single tag an executor is willing to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawUnitExecutorContext")]
pub struct UnitExecutorContext {
    tag: String,
}

impl UnitExecutorContext {
    pub fn new(tag: impl Into<String>) -> ConstellationResult<Self> {
        let tag = tag.into();
        check_tag(&tag)?;
        Ok(Self { tag })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// A set of tags an executor is willing to run.
///
/// When `ordered` is set, work queues try the tags in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawOrExecutorContext")]
pub struct OrExecutorContext {
    members: Vec<UnitExecutorContext>,
    ordered: bool,
}

impl OrExecutorContext {
    pub fn new(mut members: Vec<UnitExecutorContext>, ordered: bool) -> ConstellationResult<Self> {
        if members.len() < 2 {
            return Err(ConstellationError::InvalidContext(format!(
                "an Or context needs at least 2 members, got {}",
                members.len()
            )));
        }
        if !ordered {
            members.sort_by(|a, b| (tag_hash(&a.tag), &a.tag).cmp(&(tag_hash(&b.tag), &b.tag)));
        }
        Ok(Self { members, ordered })
    }

    pub fn members(&self) -> &[UnitExecutorContext] {
        &self.members
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }
}

/// The context an executor declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutorContext {
    Unit(UnitExecutorContext),
    Or(OrExecutorContext),
}

impl ExecutorContext {
    pub fn unit(tag: impl Into<String>) -> ConstellationResult<Self> {
        Ok(ExecutorContext::Unit(UnitExecutorContext::new(tag)?))
    }

    /// Convenience constructor taking plain tags.
    pub fn or<I, S>(tags: I, ordered: bool) -> ConstellationResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = tags
            .into_iter()
            .map(UnitExecutorContext::new)
            .collect::<ConstellationResult<Vec<_>>>()?;
        Ok(ExecutorContext::Or(OrExecutorContext::new(members, ordered)?))
    }

    pub fn units(&self) -> &[UnitExecutorContext] {
        match self {
            ExecutorContext::Unit(unit) => std::slice::from_ref(unit),
            ExecutorContext::Or(or) => or.members(),
        }
    }

    /// Whether tags must be tried in declaration order.
    pub fn is_ordered(&self) -> bool {
        match self {
            ExecutorContext::Unit(_) => true,
            ExecutorContext::Or(or) => or.is_ordered(),
        }
    }
}

impl Default for ExecutorContext {
    fn default() -> Self {
        ExecutorContext::Unit(UnitExecutorContext {
            tag: DEFAULT_TAG.to_string(),
        })
    }
}

impl fmt::Display for ExecutorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorContext::Unit(unit) => write!(f, "{}", unit.tag()),
            ExecutorContext::Or(or) => {
                let tags: Vec<&str> = or.members().iter().map(|m| m.tag()).collect();
                write!(f, "OR({})", tags.join(", "))
            }
        }
    }
}

/// Free-function form of [`ActivityContext::satisfied_by`].
pub fn satisfied_by(
    activity: &ActivityContext,
    executor: Option<&ExecutorContext>,
    strategy: &StealStrategy,
) -> bool {
    activity.satisfied_by(executor, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn unit(tag: &str, rank: i64) -> UnitActivityContext {
        UnitActivityContext::new(tag, rank).unwrap()
    }

    #[test]
    fn test_unit_hash_ignores_rank() {
        let mut set = HashSet::new();
        set.insert(unit("X", 1));
        set.insert(unit("X", 2));
        // same bucket, still two distinct values
        assert_eq!(set.len(), 2);
        assert_eq!(tag_hash("X"), tag_hash("X"));
    }

    #[test]
    fn test_ordered_or_keeps_declaration_order() {
        let a = OrActivityContext::new(vec![unit("B", 1), unit("A", 1)], true).unwrap();
        let b = OrActivityContext::new(vec![unit("A", 1), unit("B", 1)], true).unwrap();
        assert_eq!(a.members()[0].tag(), "B");
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_tag_rejected() {
        assert!(UnitActivityContext::new("", 0).is_err());
        assert!(ExecutorContext::unit("").is_err());
    }
}
