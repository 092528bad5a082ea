//! Events: the messages activities exchange.

use crate::identifier::ActivityIdentifier;

/// A message from one activity to another.
///
/// `data` is an opaque body the activities agree on. `buffers` are raw byte
/// payloads that travel after the body on the wire instead of inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub source: ActivityIdentifier,
    pub target: ActivityIdentifier,
    pub data: Vec<u8>,
    pub buffers: Vec<Vec<u8>>,
}

impl Event {
    pub fn new(source: ActivityIdentifier, target: ActivityIdentifier, data: Vec<u8>) -> Self {
        Self {
            source,
            target,
            data,
            buffers: Vec::new(),
        }
    }

    pub fn with_buffers(mut self, buffers: Vec<Vec<u8>>) -> Self {
        self.buffers = buffers;
        self
    }

    /// Total number of payload bytes, body and buffers.
    pub fn payload_len(&self) -> usize {
        self.data.len() + self.buffers.iter().map(Vec::len).sum::<usize>()
    }
}
