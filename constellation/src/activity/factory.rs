use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use constellation_api::{Activity, ConstellationError, ConstellationResult};

/// Rebuilds an activity from the bytes produced by [`Activity::encode`].
pub type ActivityDecoder =
    Arc<dyn Fn(&[u8]) -> ConstellationResult<Box<dyn Activity>> + Send + Sync>;

/// Registry of decoders keyed by [`Activity::kind`].
///
/// Every node must register the same kinds; a stolen activity of an unknown
/// kind cannot be rebuilt and is reported back as a decoding failure.
#[derive(Clone, Default)]
pub struct ActivityFactory {
    decoders: HashMap<String, ActivityDecoder>,
}

impl fmt::Debug for ActivityFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("ActivityFactory").field("kinds", &kinds).finish()
    }
}

impl ActivityFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decoder` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(&[u8]) -> ConstellationResult<Box<dyn Activity>> + Send + Sync + 'static,
    {
        self.decoders.insert(kind.into(), Arc::new(decoder));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn decode(&self, kind: &str, state: &[u8]) -> ConstellationResult<Box<dyn Activity>> {
        let decoder = self
            .decoders
            .get(kind)
            .ok_or_else(|| ConstellationError::UnknownActivityKind(kind.to_string()))?;
        decoder(state)
    }
}
