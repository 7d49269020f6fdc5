//! Nullable random: deterministic 32-byte values for nonces and txids.

use bridge_types::Hash32;
use std::sync::Mutex;

use crate::lock;

/// Returns pre-configured values in order, wrapping around.
pub struct NullRandom {
    outputs: Vec<[u8; 32]>,
    index: Mutex<usize>,
}

impl NullRandom {
    /// Create with a sequence of deterministic random values.
    pub fn new(outputs: Vec<[u8; 32]>) -> Self {
        Self {
            outputs,
            index: Mutex::new(0),
        }
    }

    /// Create with a single value that will be returned for every call.
    pub fn constant(value: [u8; 32]) -> Self {
        Self::new(vec![value])
    }

    /// `[1; 32]`, `[2; 32]`, ... up to `count` distinct values.
    pub fn counting(count: u8) -> Self {
        Self::new((1..=count.max(1)).map(|n| [n; 32]).collect())
    }

    pub fn next_bytes(&self) -> [u8; 32] {
        let mut index = lock(&self.index);
        let value = self.outputs.get(*index % self.outputs.len().max(1)).copied();
        *index += 1;
        value.unwrap_or([0; 32])
    }

    pub fn next_hash(&self) -> Hash32 {
        Hash32::new(self.next_bytes())
    }
}
