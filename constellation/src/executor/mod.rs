//! # Executors
//!
//! An executor is one worker thread plus the queues it owns. It runs
//! activities whose context it satisfies and looks for work in a fixed
//! order when idle.
//!
//! ## Key Concepts
//! - Fresh queue: submitted activities that have not started; stealable
//! - Restricted queue: fresh activities that must not leave the node
//! - Runnable queue: started activities woken by an event
//! - Delivered: activities that arrived in reply to this executor's steal
//!
//! ## Idle Loop
//! 1. runnable queue
//! 2. local steal: own queues, then sibling executors
//! 3. steal from the node's own pool
//! 4. steal from the pools the executor steals from
//! 5. sleep until woken or `idle_sleep_duration` elapsed
//!
//! At most one remote steal request per executor is outstanding.

pub mod outbox;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tracing::{debug, error, trace};

use constellation_api::{ConstellationIdentifier, StealStrategy};

use crate::activity::ActivityRecord;
use crate::config::{ExecutorConfig, QueueKind};
use crate::error::NodeError;
use crate::node::ConstellationNode;
use crate::queue::{create_queue, RunnableQueue, SharedRecord, SynchronizedWorkQueue};

pub use outbox::Outbox;

/// States an executor thread can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Executor has been created but not started yet
    Created,
    /// Executor thread is running
    Running,
    /// Executor has been asked to stop
    Stopping,
    /// Executor thread has exited
    Stopped,
}

/// Queues and bookkeeping of one executor, shared between its thread, the
/// node and sibling executors.
pub struct ExecutorShared {
    index: usize,
    identifier: ConstellationIdentifier,
    config: ExecutorConfig,
    fresh: SynchronizedWorkQueue,
    restricted: SynchronizedWorkQueue,
    runnable: RunnableQueue,
    delivered: Mutex<VecDeque<ActivityRecord>>,
    /// When the outstanding remote steal request was sent.
    outstanding: Mutex<Option<Instant>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl fmt::Debug for ExecutorShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorShared")
            .field("identifier", &self.identifier)
            .field("context", &self.config.context)
            .field("fresh", &self.fresh.size())
            .field("restricted", &self.restricted.size())
            .field("runnable", &self.runnable.len())
            .field("delivered", &self.delivered.lock().unwrap().len())
            .finish()
    }
}

impl ExecutorShared {
    pub fn new(index: usize, identifier: ConstellationIdentifier, config: ExecutorConfig, queue_kind: QueueKind) -> Self {
        let (wake_tx, wake_rx) = flume::bounded(1);
        Self {
            index,
            identifier,
            fresh: SynchronizedWorkQueue::new(create_queue(queue_kind, format!("fresh-{}", index))),
            restricted: SynchronizedWorkQueue::new(create_queue(queue_kind, format!("restricted-{}", index))),
            config,
            runnable: RunnableQueue::new(),
            delivered: Mutex::new(VecDeque::new()),
            outstanding: Mutex::new(None),
            wake_tx,
            wake_rx,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identifier(&self) -> ConstellationIdentifier {
        self.identifier
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn fresh(&self) -> &SynchronizedWorkQueue {
        &self.fresh
    }

    pub fn restricted(&self) -> &SynchronizedWorkQueue {
        &self.restricted
    }

    pub fn runnable(&self) -> &RunnableQueue {
        &self.runnable
    }

    /// Whether this executor may run an activity with `record`'s context.
    pub fn accepts(&self, record: &ActivityRecord) -> bool {
        record
            .context()
            .satisfied_by(Some(&self.config.context), &StealStrategy::Any)
    }

    /// Queue a woken record and wake the thread.
    pub fn push_runnable(&self, record: SharedRecord) {
        self.runnable.push(record);
        self.wake();
    }

    pub fn deliver(&self, record: ActivityRecord) {
        self.delivered.lock().unwrap().push_back(record);
        self.wake();
    }

    pub fn take_delivered(&self) -> Option<ActivityRecord> {
        self.delivered.lock().unwrap().pop_front()
    }

    /// Reserve the remote steal slot. `false` while a request younger than
    /// `timeout` is outstanding.
    pub fn try_begin_steal(&self, timeout: Duration) -> bool {
        let mut outstanding = self.outstanding.lock().unwrap();
        match *outstanding {
            Some(sent) if sent.elapsed() < timeout => false,
            Some(_) => {
                trace!(executor = %self.identifier, "remote steal timed out");
                *outstanding = Some(Instant::now());
                true
            }
            None => {
                *outstanding = Some(Instant::now());
                true
            }
        }
    }

    pub fn end_steal(&self) {
        *self.outstanding.lock().unwrap() = None;
    }

    pub fn has_outstanding_steal(&self) -> bool {
        self.outstanding.lock().unwrap().is_some()
    }

    /// Pending work held by this executor, excluding running activities.
    pub fn backlog(&self) -> usize {
        self.fresh.size() + self.restricted.size() + self.runnable.len() + self.delivered.lock().unwrap().len()
    }

    pub fn wake(&self) {
        // a full slot already means "wake up"
        let _ = self.wake_tx.try_send(());
    }

    fn sleep(&self, timeout: Duration) {
        let _ = self.wake_rx.recv_timeout(timeout);
    }
}

/// Handle to a running executor thread.
pub struct Executor {
    shared: Arc<ExecutorShared>,
    state: Arc<Mutex<WorkerState>>,
    stop: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("identifier", &self.shared.identifier)
            .field("state", &*self.state.lock().unwrap())
            .field("has_thread", &self.thread_handle.lock().unwrap().is_some())
            .finish()
    }
}

impl Executor {
    pub fn new(shared: Arc<ExecutorShared>) -> Self {
        Self {
            shared,
            state: Arc::new(Mutex::new(WorkerState::Created)),
            stop: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn shared(&self) -> &Arc<ExecutorShared> {
        &self.shared
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    /// Start the executor thread
    pub fn start(&self, node: Weak<ConstellationNode>, idle_sleep: Duration) -> Result<(), NodeError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                WorkerState::Created => *state = WorkerState::Running,
                other => {
                    return Err(NodeError::ThreadSetupError(format!(
                        "cannot start executor {} in state {:?}",
                        self.shared.identifier, other
                    )));
                }
            }
        }

        let shared = Arc::clone(&self.shared);
        let stop = Arc::clone(&self.stop);
        let state = Arc::clone(&self.state);
        let name = format!("constellation-executor-{}-{}", self.shared.identifier.node, self.shared.index);
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                Self::executor_thread_main(shared, node, stop, idle_sleep);
                *state.lock().unwrap() = WorkerState::Stopped;
            })
            .map_err(|e| {
                NodeError::ThreadSetupError(format!(
                    "failed to spawn executor {}: {}",
                    self.shared.identifier, e
                ))
            })?;

        *self.thread_handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Ask the thread to stop and wait for it
    pub fn stop(&self) -> Result<(), NodeError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                WorkerState::Running => *state = WorkerState::Stopping,
                WorkerState::Created | WorkerState::Stopped => return Ok(()),
                WorkerState::Stopping => {}
            }
        }
        self.stop.store(true, Ordering::Release);
        self.shared.wake();

        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            handle.join().map_err(|_| {
                NodeError::ThreadSetupError(format!("executor {} panicked", self.shared.identifier))
            })?;
        }
        Ok(())
    }

    fn executor_thread_main(
        shared: Arc<ExecutorShared>,
        node: Weak<ConstellationNode>,
        stop: Arc<AtomicBool>,
        idle_sleep: Duration,
    ) {
        let identifier = shared.identifier;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            debug!(executor = %identifier, "executor started");
            while !stop.load(Ordering::Acquire) {
                let Some(node) = node.upgrade() else {
                    break;
                };
                if !Self::run_once(&node, &shared) {
                    drop(node);
                    shared.sleep(idle_sleep);
                }
            }
        }));

        match result {
            Ok(()) => debug!(executor = %identifier, "executor stopped"),
            Err(e) => {
                let panic_msg = if let Some(s) = e.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = e.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "Unknown panic".to_string()
                };
                error!(executor = %identifier, panic = %panic_msg, "executor thread panicked");
            }
        }
    }

    /// One pass of the idle loop. `false` when no work was found.
    fn run_once(node: &ConstellationNode, shared: &ExecutorShared) -> bool {
        if let Some(record) = shared.runnable.try_pop() {
            node.run_started(shared, record);
            return true;
        }
        let index = shared.index;
        let found = node
            .steal_local(index)
            .or_else(|| node.steal_constellation(index))
            .or_else(|| node.steal_remote(index));
        match found {
            Some(record) => {
                node.start(shared, record);
                true
            }
            None => false,
        }
    }
}
