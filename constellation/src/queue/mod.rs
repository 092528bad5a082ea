//! # Work Queues
//!
//! Pending (not yet started) activity records, served to executors and
//! thieves by context and steal strategy.
//!
//! ## Implementations
//! - [`SmartSortedWorkQueue`]: per-tag rank-sorted lists with mirrored
//!   entries for `Or` contexts
//! - [`SimpleWorkQueue`]: a single deque scanned on every steal
//! - [`SynchronizedWorkQueue`]: one coarse lock around either of the above
//! - [`RunnableQueue`]: lock-free FIFO of records woken by events
//!
//! Stealing from an empty queue, or for a tag the queue has never seen,
//! returns `None`; it is never an error.

pub mod runnable;
pub mod simple;
pub mod smart;
pub mod sorted;
pub mod synchronized;

use std::fmt;

use constellation_api::{ExecutorContext, StealStrategy};

use crate::activity::ActivityRecord;
use crate::config::QueueKind;

pub use runnable::{RunnableQueue, SharedRecord};
pub use simple::SimpleWorkQueue;
pub use smart::SmartSortedWorkQueue;
pub use synchronized::SynchronizedWorkQueue;

/// Storage for pending activity records.
pub trait WorkQueue: fmt::Debug + Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Store a record under every tag of its context.
    fn enqueue(&mut self, record: ActivityRecord);

    /// Remove one record runnable by `context`, chosen by `strategy`.
    fn steal(&mut self, context: &ExecutorContext, strategy: &StealStrategy) -> Option<ActivityRecord>;

    /// Number of distinct pending records.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove up to `max` records.
    fn steal_batch(
        &mut self,
        context: &ExecutorContext,
        strategy: &StealStrategy,
        max: usize,
    ) -> Vec<ActivityRecord> {
        let mut stolen = Vec::new();
        while stolen.len() < max {
            match self.steal(context, strategy) {
                Some(record) => stolen.push(record),
                None => break,
            }
        }
        stolen
    }
}

/// Create a boxed queue of the configured kind.
pub fn create_queue(kind: QueueKind, name: impl Into<String>) -> Box<dyn WorkQueue> {
    match kind {
        QueueKind::SmartSorted => Box::new(SmartSortedWorkQueue::new(name)),
        QueueKind::Simple => Box::new(SimpleWorkQueue::new(name)),
    }
}
