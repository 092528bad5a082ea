//! # Constellation Error Types
//!
//! This module defines the error type shared by the API crate and the runtime.
//!
//! ## Error Classes
//!
//! - Usage errors: invalid API sequencing or bad constructor arguments. These
//!   are returned immediately and are never recoverable by retrying.
//! - Activity faults: a hook reported an error. The runtime captures these in
//!   the record's `Error` state instead of propagating them, so a faulty
//!   activity never takes its executor down. [`ActivityError`] is what hooks
//!   return.
//! - Everything that touches the network reports failure as `bool`/`Option`
//!   and is not represented here.
//!
//! ## Usage Example
//!
//! ```rust
//! use constellation_api::context::OrActivityContext;
//! use constellation_api::errors::ConstellationError;
//!
//! let err = OrActivityContext::new(vec![], false).unwrap_err();
//! assert!(matches!(err, ConstellationError::InvalidContext(_)));
//! ```

use thiserror::Error;

/// Errors raised by structural misuse of the scheduler API.
#[derive(Error, Debug)]
pub enum ConstellationError {
    /// A context could not be constructed from the given arguments.
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// A steal strategy could not be constructed from the given arguments.
    #[error("Invalid steal strategy: {0}")]
    InvalidStrategy(String),

    /// An operation was invoked in a state that does not allow it.
    ///
    /// Examples: running a record that is already `Done`, enqueueing an
    /// event on an activity that does not expect events.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// No factory is registered for an activity kind received over the wire.
    #[error("Unknown activity kind: {0}")]
    UnknownActivityKind(String),

    /// An activity could not be turned into bytes or back.
    #[error("Activity encoding failed: {0}")]
    Encoding(String),

    /// The scheduler has been shut down.
    #[error("Constellation is not running")]
    NotRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error reported by an activity hook.
///
/// The runtime never propagates this to the executor; it is stored on the
/// record, which then ends in the `Error` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Activity fault: {0}")]
pub struct ActivityError(pub String);

impl ActivityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for ActivityError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ActivityError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

pub type ConstellationResult<T> = Result<T, ConstellationError>;
