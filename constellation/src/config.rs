use std::time::Duration;

use constellation_api::{ExecutorContext, StealPool, StealStrategy};

use crate::error::NodeError;

// --- Configuration Enums ---

/// Which work queue implementation executors use for pending activities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QueueKind {
    /// Per-tag rank-sorted lists; steals are proportional to the matched list.
    #[default]
    SmartSorted,
    /// One deque scanned linearly on every steal.
    Simple,
}

// --- Executor Configuration ---

/// Configuration of a single executor.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Which activities this executor may run.
    pub context: ExecutorContext,

    /// The pool this executor's node offers work to.
    pub belongs_to: StealPool,

    /// The pools this executor steals from as a last resort.
    pub steals_from: StealPool,

    /// Strategy for the executor's own queue and sibling executors.
    pub local_strategy: StealStrategy,

    /// Strategy for nodes in the executor's own pool.
    pub constellation_strategy: StealStrategy,

    /// Strategy for nodes in the pools it steals from.
    pub remote_strategy: StealStrategy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            context: ExecutorContext::default(),
            belongs_to: StealPool::World,
            steals_from: StealPool::World,
            local_strategy: StealStrategy::Smallest,
            constellation_strategy: StealStrategy::Biggest,
            remote_strategy: StealStrategy::Biggest,
        }
    }
}

impl ExecutorConfig {
    pub fn with_context(context: ExecutorContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }
}

// --- Node Configuration ---

/// Configuration for a `ConstellationNode`.
#[derive(Clone, Debug)]
pub struct ConstellationConfig {
    /// One entry per executor thread.
    pub executors: Vec<ExecutorConfig>,

    /// Queue implementation for pending activities.
    pub queue_kind: QueueKind,

    /// Closed pools run the ping/pong/release handshake at activation.
    pub closed_pool: bool,

    /// Upper bound for every activation wait (pong, time reply, release).
    pub activation_timeout: Duration,

    /// How long to wait for the master election to resolve.
    pub election_timeout: Duration,

    /// Fastest polling interval of the pool updater.
    pub updater_min_interval: Duration,

    /// Slowest polling interval of the pool updater.
    pub updater_max_interval: Duration,

    /// Maximum activities handed out per steal request.
    pub steal_batch_size: usize,

    /// After this long without a reply a remote steal is considered lost.
    pub steal_timeout: Duration,

    /// Sleep between steal attempts when an executor found no work.
    pub idle_sleep_duration: Duration,

    /// Whether executors steal from other nodes at all.
    pub remote_stealing: bool,
}

impl Default for ConstellationConfig {
    fn default() -> Self {
        Self {
            executors: (0..num_cpus::get()).map(|_| ExecutorConfig::default()).collect(),
            queue_kind: QueueKind::SmartSorted,
            closed_pool: false,
            activation_timeout: Duration::from_secs(30),
            election_timeout: Duration::from_secs(10),
            updater_min_interval: Duration::from_millis(50),
            updater_max_interval: Duration::from_secs(2),
            steal_batch_size: 1,
            steal_timeout: Duration::from_secs(1),
            idle_sleep_duration: Duration::from_millis(1),
            remote_stealing: true,
        }
    }
}

impl ConstellationConfig {
    /// A configuration with `count` identical executors.
    pub fn with_executors(count: usize, executor: ExecutorConfig) -> Self {
        Self {
            executors: vec![executor; count],
            ..Default::default()
        }
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.executors.is_empty() {
            return Err(NodeError::ConfigError("at least one executor is required".to_string()));
        }
        if self.steal_batch_size == 0 {
            return Err(NodeError::ConfigError("steal batch size must be positive".to_string()));
        }
        if self.steal_timeout.is_zero() {
            return Err(NodeError::ConfigError("steal timeout must be positive".to_string()));
        }
        if self.updater_min_interval.is_zero() {
            return Err(NodeError::ConfigError("updater minimum interval must be positive".to_string()));
        }
        if self.updater_min_interval > self.updater_max_interval {
            return Err(NodeError::ConfigError(format!(
                "updater interval range is inverted: {:?} > {:?}",
                self.updater_min_interval, self.updater_max_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ConstellationConfig::default();
        assert!(!config.executors.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_updater_range_rejected() {
        let config = ConstellationConfig {
            updater_min_interval: Duration::from_secs(5),
            updater_max_interval: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(NodeError::ConfigError(_))));
    }

    #[test]
    fn test_no_executors_rejected() {
        let config = ConstellationConfig {
            executors: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
