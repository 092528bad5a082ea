use std::fmt;
use std::sync::{Arc, Mutex};

use crossbeam_queue::SegQueue;

use crate::activity::ActivityRecord;

/// A started activity, shared between its executor and event delivery.
pub type SharedRecord = Arc<Mutex<ActivityRecord>>;

/// A queue of started activities that have events ready for processing.
///
/// Event delivery pushes a record here when it turns `Runnable`; the owning
/// executor pops records and runs one event at a time, pushing the record
/// back while more events remain.
///
/// # Thread Safety
/// - Lock-free queue (SegQueue); safe for concurrent producers and consumers
/// - A record is only pushed on the Suspended -> Runnable edge, so it is never
///   queued twice
pub struct RunnableQueue {
    queue: SegQueue<SharedRecord>,
}

impl fmt::Debug for RunnableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnableQueue")
            .field("len", &self.queue.len())
            .finish()
    }
}

impl Default for RunnableQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnableQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    pub fn push(&self, record: SharedRecord) {
        self.queue.push(record);
    }

    pub fn try_pop(&self) -> Option<SharedRecord> {
        self.queue.pop()
    }

    /// Snapshot; may change by the time the value is used.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
