use std::time::Duration;

use thiserror::Error;

use constellation_api::ConstellationError;

/// Errors from encoding or decoding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u8),
    #[error("Message truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Opcode {0} requires a body")]
    MissingBody(u8),
    #[error("Failed to encode message: {0}")]
    Encode(String),
    #[error("Failed to decode message: {0}")]
    Decode(String),
    #[error("Buffer count mismatch: body declares {declared}, frame carries {carried}")]
    BufferMismatch { declared: usize, carried: usize },
}

/// Errors related to pool coordination.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Activation timed out after {timeout:?} waiting for {what}")]
    ActivationTimeout { what: String, timeout: Duration },
    #[error("Election for {0} did not resolve")]
    ElectionUnresolved(String),
    #[error("No location known for node rank {0}")]
    UnknownRank(i32),
    #[error("Failed to send {what} to {destination}")]
    SendFailed { what: String, destination: String },
    #[error("Pool coordinator is not active")]
    NotActive,
}

/// Errors related to the node itself.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Thread setup error: {0}")]
    ThreadSetupError(String),
    #[error("Node is not running")]
    NotRunning,
    #[error("Node is already running")]
    AlreadyRunning,
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Constellation(#[from] ConstellationError),
    #[error("Internal node error: {0}")]
    Other(#[from] anyhow::Error),
}
