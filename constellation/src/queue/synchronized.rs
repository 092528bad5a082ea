use std::fmt;
use std::sync::Mutex;

use constellation_api::{ExecutorContext, StealStrategy};

use super::WorkQueue;
use crate::activity::ActivityRecord;

/// A work queue shared between threads behind a single mutex.
///
/// Executors, siblings stealing locally and the coordinator answering steal
/// requests all go through this lock. Size and removals are therefore
/// always observed consistently.
pub struct SynchronizedWorkQueue {
    inner: Mutex<Box<dyn WorkQueue>>,
}

impl fmt::Debug for SynchronizedWorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("SynchronizedWorkQueue")
            .field("name", &inner.name())
            .field("size", &inner.size())
            .finish()
    }
}

impl SynchronizedWorkQueue {
    pub fn new(queue: Box<dyn WorkQueue>) -> Self {
        Self {
            inner: Mutex::new(queue),
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name().to_string()
    }

    pub fn enqueue(&self, record: ActivityRecord) {
        self.inner.lock().unwrap().enqueue(record);
    }

    pub fn steal(&self, context: &ExecutorContext, strategy: &StealStrategy) -> Option<ActivityRecord> {
        self.inner.lock().unwrap().steal(context, strategy)
    }

    pub fn steal_batch(&self, context: &ExecutorContext, strategy: &StealStrategy, max: usize) -> Vec<ActivityRecord> {
        self.inner.lock().unwrap().steal_batch(context, strategy, max)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
