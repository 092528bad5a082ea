// Constellation Runtime
//
// This crate runs Constellation activities: per-node executor threads with
// context-matched work queues, work stealing inside a node and across
// steal pools, event routing to migrated activities, and the pool
// coordination protocol that ties the nodes of a cluster together.

pub mod activity;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod node;
pub mod pool;
pub mod queue;
pub mod transport;
pub mod wire;

// Re-export commonly used types
pub use activity::{ActivityFactory, ActivityRecord, RunState};
pub use config::{ConstellationConfig, ExecutorConfig, QueueKind};
pub use error::{NodeError, PoolError, WireError};
pub use node::{ConstellationNode, NodeState, EXTERNAL_EXECUTOR};
pub use pool::{PoolCoordinator, PoolInfo};
pub use transport::{LoopbackNetwork, LoopbackTransport};

pub use constellation_api::*;
