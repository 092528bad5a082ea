//! # Constellation API
//!
//! Vocabulary shared by every part of the Constellation work-stealing
//! scheduler. Nothing in this crate spawns threads or touches the network.
//!
//! ## Core Components
//!
//! - **Contexts**: typed tags (with ranks) that match activities to executors
//! - **Steal strategies**: rank-selection policies applied when stealing
//! - **Steal pools**: named groups of nodes that share work
//! - **Activities**: suspendable, event-driven units of work
//! - **Transport**: the interface the runtime needs from a messaging layer
//!
//! ## Usage Example
//!
//! ```rust
//! use constellation_api::{ActivityContext, ExecutorContext, StealStrategy};
//!
//! let activity = ActivityContext::unit("render", 7).unwrap();
//! let executor = ExecutorContext::unit("render").unwrap();
//!
//! assert!(activity.satisfied_by(Some(&executor), &StealStrategy::Any));
//! assert!(!activity.satisfied_by(Some(&executor), &StealStrategy::Value(3)));
//! assert!(!activity.satisfied_by(None, &StealStrategy::Any));
//! ```
//!
//! ## Module Organization
//!
//! - [`context`]: activity and executor contexts and the matching rule
//! - [`strategy`]: steal strategies
//! - [`steal_pool`]: steal-pool algebra
//! - [`identifier`]: node, executor and activity identifiers
//! - [`event`]: inter-activity events
//! - [`activity`]: the activity trait and the scheduler handle
//! - [`transport`]: communication layer adapter
//! - [`errors`]: error types

pub mod activity;
pub mod context;
pub mod errors;
pub mod event;
pub mod identifier;
pub mod steal_pool;
pub mod strategy;
pub mod transport;

pub use activity::{Activity, Constellation, Step};
pub use context::{
    satisfied_by, ActivityContext, ExecutorContext, OrActivityContext, OrExecutorContext,
    UnitActivityContext, UnitExecutorContext,
};
pub use errors::{ActivityError, ConstellationError, ConstellationResult};
pub use event::Event;
pub use identifier::{ActivityIdentifier, ConstellationIdentifier, NodeRank};
pub use steal_pool::StealPool;
pub use strategy::StealStrategy;
pub use transport::{MessageHandler, NodeId, Transport};
