//! Cluster membership, steal-pool gossip and message routing.
//!
//! - [`coordinator`]: the node's single point of contact with the transport
//! - [`info`]: versioned pool membership snapshots
//! - [`registry`]: local copies of owned and followed pools
//! - [`location`]: node rank to transport identity cache
//! - [`clock`]: clock offsets measured at activation
//! - [`updater`]: background polling of followed pools

pub mod clock;
pub mod coordinator;
pub mod info;
pub mod location;
pub mod registry;
pub mod updater;

pub use clock::TimeSync;
pub use coordinator::{CoordinatorConfig, PoolCoordinator, SchedulerRef, Victim};
pub use info::PoolInfo;
pub use location::LocationCache;
pub use registry::PoolRegistry;
pub use updater::Backoff;
