//! Background gossip of pool membership.
//!
//! One thread per node asks the master of every followed pool for a newer
//! copy. The polling interval doubles after each round without news, up to
//! the configured maximum, and drops back to the minimum once an update is
//! committed. The same thread retries rank lookups that went unanswered,
//! on its own fixed cadence.

use std::sync::{Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::error::NodeError;

use super::coordinator::PoolCoordinator;

/// Exponential back-off between a fixed floor and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, current: min }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advance after one polling round.
    pub fn next(&mut self, updated: bool) -> Duration {
        self.current = if updated {
            self.min
        } else {
            (self.current * 2).min(self.max)
        };
        self.current
    }
}

pub struct PoolUpdater {
    stop_tx: Mutex<Option<Sender<()>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PoolUpdater {
    /// Spawn the updater thread for `coordinator`.
    pub fn start(
        coordinator: Weak<PoolCoordinator>,
        min: Duration,
        max: Duration,
        lookup_retry: Duration,
        name: String,
    ) -> Result<Self, NodeError> {
        let (stop_tx, stop_rx) = flume::bounded(1);
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || Self::updater_thread_main(coordinator, stop_rx, Backoff::new(min, max), lookup_retry))
            .map_err(|e| NodeError::ThreadSetupError(format!("failed to spawn pool updater: {}", e)))?;
        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            if handle.join().is_err() {
                debug!("pool updater thread panicked");
            }
        }
    }

    fn updater_thread_main(
        coordinator: Weak<PoolCoordinator>,
        stop_rx: Receiver<()>,
        mut backoff: Backoff,
        lookup_retry: Duration,
    ) {
        let mut next_poll = Instant::now() + backoff.current();
        loop {
            let now = Instant::now();
            let wait = next_poll.saturating_duration_since(now).min(lookup_retry);
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            coordinator.retry_lookups();
            if Instant::now() < next_poll {
                continue;
            }
            coordinator.poll_followed_pools();
            let updated = coordinator.take_update_flag();
            let interval = backoff.next(updated);
            next_poll = Instant::now() + interval;
            trace!(updated, interval = ?interval, "pool updater round");
        }
        debug!("pool updater stopped");
    }
}
