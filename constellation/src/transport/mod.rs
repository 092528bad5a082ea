//! Transport implementations shipped with the runtime.

pub mod loopback;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
