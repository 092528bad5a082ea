use std::fmt;

use tracing::trace;

use constellation_api::{ExecutorContext, StealStrategy};

use super::WorkQueue;
use super::sorted::RankedLists;
use crate::activity::ActivityRecord;

/// Work queue keeping one rank-sorted list per context tag.
///
/// A record with an `Or` context is linked into the list of every member tag
/// and removed from all of them when a steal through any one tag takes it.
pub struct SmartSortedWorkQueue {
    name: String,
    lists: RankedLists<ActivityRecord>,
}

impl fmt::Debug for SmartSortedWorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartSortedWorkQueue")
            .field("name", &self.name)
            .field("size", &self.lists.len())
            .finish()
    }
}

impl SmartSortedWorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lists: RankedLists::new(),
        }
    }

    /// Number of entries listed under `tag`, counting mirrors.
    pub fn tag_len(&self, tag: &str) -> usize {
        self.lists.list_len(tag)
    }
}

impl WorkQueue for SmartSortedWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&mut self, record: ActivityRecord) {
        let keys: Vec<(String, i64)> = record
            .context()
            .units()
            .iter()
            .map(|unit| (unit.tag().to_string(), unit.rank()))
            .collect();
        trace!(queue = %self.name, activity = %record.identifier(), tags = keys.len(), "enqueue");
        self.lists.insert(keys, record);
    }

    fn steal(&mut self, context: &ExecutorContext, strategy: &StealStrategy) -> Option<ActivityRecord> {
        let tags = context.units();

        // an unordered Or executor wants the global extreme across its tags
        let compare_all = !context.is_ordered()
            && matches!(strategy, StealStrategy::Smallest | StealStrategy::Biggest);

        let node = if compare_all {
            let candidates = tags.iter().filter_map(|unit| self.lists.candidate(unit.tag(), strategy));
            match strategy {
                StealStrategy::Smallest => candidates.min_by_key(|&(_, rank)| rank),
                _ => candidates.max_by_key(|&(_, rank)| rank),
            }
        } else {
            tags.iter().find_map(|unit| self.lists.candidate(unit.tag(), strategy))
        };

        let (node, _) = node?;
        let record = self.lists.remove(node)?;
        trace!(queue = %self.name, activity = %record.identifier(), strategy = %strategy, "steal");
        Some(record)
    }

    fn size(&self) -> usize {
        self.lists.len()
    }
}
