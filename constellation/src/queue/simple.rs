use std::collections::VecDeque;
use std::fmt;

use constellation_api::{ActivityContext, ExecutorContext, StealStrategy};

use super::WorkQueue;
use crate::activity::ActivityRecord;

/// Work queue backed by a single deque.
///
/// Every steal scans the deque with the context matching rule. Cheap for
/// short queues and for executors that accept almost everything.
pub struct SimpleWorkQueue {
    name: String,
    records: VecDeque<ActivityRecord>,
}

impl fmt::Debug for SimpleWorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleWorkQueue")
            .field("name", &self.name)
            .field("size", &self.records.len())
            .finish()
    }
}

/// Rank under which `activity` matches `executor`, picking the member the
/// strategy prefers when several match.
fn matching_rank(activity: &ActivityContext, executor: &ExecutorContext, strategy: &StealStrategy) -> Option<i64> {
    let ranks = activity
        .units()
        .iter()
        .filter(|unit| executor.units().iter().any(|e| unit.satisfied_by_tag(e.tag(), strategy)))
        .map(|unit| unit.rank());
    match strategy {
        StealStrategy::Smallest => ranks.min(),
        _ => ranks.max(),
    }
}

impl SimpleWorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: VecDeque::new(),
        }
    }
}

impl WorkQueue for SimpleWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&mut self, record: ActivityRecord) {
        self.records.push_back(record);
    }

    fn steal(&mut self, context: &ExecutorContext, strategy: &StealStrategy) -> Option<ActivityRecord> {
        let matches = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| matching_rank(record.context(), context, strategy).map(|rank| (index, rank)));

        let chosen = match strategy {
            // tail of a sorted list: highest rank, newest first
            StealStrategy::Biggest | StealStrategy::Any => matches.max_by_key(|&(index, rank)| (rank, index)),
            // same order as the head of a sorted list: lowest rank, oldest first
            StealStrategy::Smallest | StealStrategy::Value(_) | StealStrategy::Range(_, _) => {
                matches.min_by_key(|&(index, rank)| (rank, index))
            }
        };

        let (index, _) = chosen?;
        self.records.remove(index)
    }

    fn size(&self) -> usize {
        self.records.len()
    }
}
