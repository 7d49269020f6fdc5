//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use bridge_rpc::RpcConfig;
use bridge_utils::{LogFormat, RetryPolicy};

use crate::GatewayError;

/// Configuration for a [`GatewayEngine`](crate::GatewayEngine).
///
/// Can be loaded from a TOML file via [`GatewayConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Custody-network client settings, under `[rpc]`.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Delay between source-chain confirmation polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts at the whole submit-and-wait-for-signature sequence.
    #[serde(default = "default_session_retries")]
    pub session_retries: u32,

    /// Delay between `ren_queryTx` polls while waiting for a signature.
    #[serde(default = "default_signature_poll_interval_ms")]
    pub signature_poll_interval_ms: u64,

    /// Polls per signing attempt before the attempt is abandoned.
    #[serde(default = "default_signature_poll_limit")]
    pub signature_poll_limit: u32,

    /// Attempts at broadcasting to the destination chain.
    #[serde(default = "default_destination_retries")]
    pub destination_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Sessions stop accepting deposits this long after creation.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Buffered progress events per session.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Register new gateways with `ren_submitGateway` so deposits can be
    /// recovered without the session record.
    #[serde(default = "default_true")]
    pub register_gateway: bool,

    /// Check the selector against the network whitelist on creation.
    #[serde(default = "default_true")]
    pub verify_selector: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_session_retries() -> u32 {
    10
}

fn default_signature_poll_interval_ms() -> u64 {
    15_000
}

fn default_signature_poll_limit() -> u32 {
    240
}

fn default_destination_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

fn default_event_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, GatewayError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GatewayError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, GatewayError> {
        toml::from_str(s).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, GatewayError> {
        toml::to_string_pretty(self).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Install the global subscriber with the configured format and level.
    pub fn init_logging(&self) -> bool {
        bridge_utils::init_logging(self.log_format, &self.log_level)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn signature_poll_interval(&self) -> Duration {
        Duration::from_millis(self.signature_poll_interval_ms)
    }

    pub(crate) fn session_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.session_retries,
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.retry_backoff_ms.saturating_mul(16)),
        )
    }

    pub(crate) fn destination_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.destination_retries,
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.retry_backoff_ms.saturating_mul(16)),
        )
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            session_retries: default_session_retries(),
            signature_poll_interval_ms: default_signature_poll_interval_ms(),
            signature_poll_limit: default_signature_poll_limit(),
            destination_retries: default_destination_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            session_ttl_secs: default_session_ttl_secs(),
            event_capacity: default_event_capacity(),
            register_gateway: default_true(),
            verify_selector: default_true(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}
