//! Shard selection cache.
//!
//! Every transaction for an asset needs the same shard key. The cache is
//! shared between tasks so concurrent sessions agree on one lookup result
//! until it expires or is invalidated after a reshard.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use bridge_types::Timestamp;

/// The shard responsible for an asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard {
    pub asset: String,
    /// Compressed or uncompressed SEC1 public key.
    pub public_key: Vec<u8>,
    /// When this selection stops being reused.
    pub expiry: Option<Timestamp>,
}

struct CachedShard {
    shard: Shard,
    fetched: Instant,
}

pub struct ShardCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedShard>>,
}

impl ShardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Unexpired entry for `asset`.
    pub async fn get(&self, asset: &str) -> Option<Shard> {
        let entries = self.entries.read().await;
        entries
            .get(asset)
            .filter(|cached| cached.fetched.elapsed() < self.ttl)
            .map(|cached| cached.shard.clone())
    }

    /// Store `shard`, stamping its expiry.
    pub async fn insert(&self, mut shard: Shard) -> Shard {
        shard.expiry = Some(Timestamp::now().saturating_add_secs(self.ttl.as_secs()));
        let mut entries = self.entries.write().await;
        entries.insert(
            shard.asset.clone(),
            CachedShard {
                shard: shard.clone(),
                fetched: Instant::now(),
            },
        );
        shard
    }

    pub async fn invalidate(&self, asset: &str) {
        self.entries.write().await.remove(asset);
    }
}
