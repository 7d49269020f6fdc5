//! Protocol client configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use bridge_types::NetworkId;
use bridge_utils::RetryPolicy;

use crate::RpcError;

/// Configuration for [`RpcProvider`](crate::RpcProvider).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// A named network (`mainnet`, `testnet`, `devnet`) or a node URL.
    /// Ignored when `nodes` is non-empty.
    #[serde(default = "default_network")]
    pub network: String,

    /// Node URLs to fan every call out to.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per node, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,

    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,

    /// How long a selected shard is reused before the block state is
    /// queried again.
    #[serde(default = "default_shard_cache_ttl_secs")]
    pub shard_cache_ttl_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> String {
    NetworkId::Mainnet.as_str().to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_initial_backoff_ms() -> u64 {
    1_000
}

fn default_retry_max_backoff_ms() -> u64 {
    16_000
}

fn default_shard_cache_ttl_secs() -> u64 {
    600
}

// ── Impl ───────────────────────────────────────────────────────────────

impl RpcConfig {
    /// Configuration for a single node URL with default tuning.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            nodes: vec![url.into()],
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, RpcError> {
        let content = std::fs::read_to_string(path).map_err(|e| RpcError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, RpcError> {
        toml::from_str(s).map_err(|e| RpcError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, RpcError> {
        toml::to_string_pretty(self).map_err(|e| RpcError::Config(e.to_string()))
    }

    /// Node URLs to call. Named networks resolve to their default node;
    /// every URL must carry a scheme.
    pub fn node_urls(&self) -> Result<Vec<String>, RpcError> {
        let urls = if self.nodes.is_empty() {
            let url = match self.network.parse::<NetworkId>() {
                Ok(network) => network.default_rpc_url().to_string(),
                Err(_) => self.network.clone(),
            };
            vec![url]
        } else {
            self.nodes.clone()
        };
        for url in &urls {
            if !url.contains("://") {
                return Err(RpcError::InvalidUrl(format!(
                    "{url:?} is not a network name or a URL with a scheme"
                )));
            }
        }
        Ok(urls)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_backoff_ms: self.retry_initial_backoff_ms,
            max_backoff_ms: self.retry_max_backoff_ms,
        }
    }

    pub fn shard_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.shard_cache_ttl_secs)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            nodes: Vec::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            shard_cache_ttl_secs: default_shard_cache_ttl_secs(),
        }
    }
}
