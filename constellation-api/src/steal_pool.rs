//! # Steal Pools
//!
//! A steal pool names a group of nodes that share work by stealing. Each
//! executor belongs to one pool and steals from another.
//!
//! - `None`: belongs nowhere / steals from nobody
//! - `World`: every node in the cluster
//! - `Tag`: a single named pool
//! - `Set`: several named pools, kept sorted and deduplicated so that equality
//!   is independent of construction order

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StealPool {
    #[default]
    None,
    World,
    Tag(String),
    /// Invariant: at least two names, sorted, unique.
    Set(Vec<String>),
}

impl StealPool {
    pub fn tag(name: impl Into<String>) -> Self {
        StealPool::Tag(name.into())
    }

    /// A pool made of the given names. Zero names yield `None`, one yields `Tag`.
    pub fn set<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        match names.len() {
            0 => StealPool::None,
            1 => StealPool::Tag(names.remove(0)),
            _ => StealPool::Set(names),
        }
    }

    /// Union of `pools`.
    ///
    /// `World` absorbs everything, `None` operands vanish, duplicates are
    /// absorbed and an empty input yields `None`.
    pub fn merge(pools: &[StealPool]) -> StealPool {
        let mut names = Vec::new();
        for pool in pools {
            match pool {
                StealPool::World => return StealPool::World,
                StealPool::None => {}
                StealPool::Tag(name) => names.push(name.clone()),
                StealPool::Set(set) => names.extend(set.iter().cloned()),
            }
        }
        StealPool::set(names)
    }

    /// Whether work may flow between the two pools.
    pub fn overlap(&self, other: &StealPool) -> bool {
        if self.is_none() || other.is_none() {
            return false;
        }
        if self.is_world() || other.is_world() {
            return true;
        }
        let mine = self.tags();
        other.tags().iter().any(|tag| mine.contains(tag))
    }

    /// The named constituents; empty for `None` and `World`.
    pub fn tags(&self) -> &[String] {
        match self {
            StealPool::None | StealPool::World => &[],
            StealPool::Tag(name) => std::slice::from_ref(name),
            StealPool::Set(names) => names,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, StealPool::None)
    }

    pub fn is_world(&self) -> bool {
        matches!(self, StealPool::World)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, StealPool::Set(_))
    }

    /// Pick one constituent uniformly at random.
    pub fn random_select(&self) -> StealPool {
        self.random_select_with(&mut rand::thread_rng())
    }

    pub fn random_select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> StealPool {
        match self {
            StealPool::Set(names) => StealPool::Tag(names[rng.gen_range(0..names.len())].clone()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for StealPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StealPool::None => write!(f, "NONE"),
            StealPool::World => write!(f, "WORLD"),
            StealPool::Tag(name) => write!(f, "{}", name),
            StealPool::Set(names) => write!(f, "{{{}}}", names.join(", ")),
        }
    }
}
