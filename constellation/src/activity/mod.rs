//! Activity records, their state machine, and the factory that rebuilds
//! migrated activities.

pub mod factory;
pub mod record;

pub use factory::{ActivityDecoder, ActivityFactory};
pub use record::{ActivityRecord, RunState};
