//! Protocol client error types.

use std::time::Duration;
use thiserror::Error;

use bridge_pack::EncodeError;
use bridge_transactions::AssemblerError;

/// A request never produced a usable HTTP reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A well-formed JSON-RPC `error`. Never retried.
    #[error("node returned error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("all nodes failed: {}", summarize(.0))]
    AllNodesFailed(Vec<RpcError>),

    /// The reply did not have the expected shape. `raw` is the offending
    /// JSON, kept for diagnosis.
    #[error("malformed response: {reason}")]
    Decode { reason: String, raw: String },

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("transaction error: {0}")]
    Assembler(#[from] AssemblerError),

    #[error("no shard available for {0}")]
    NoShard(String),

    #[error("invalid node URL: {0}")]
    InvalidUrl(String),

    #[error("config error: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::AllNodesFailed(errors) => errors.iter().any(Self::is_retryable),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short machine-readable classification, stored in error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol { .. } => "protocol",
            Self::NotFound(_) => "not_found",
            Self::AllNodesFailed(_) if self.is_retryable() => "transport",
            Self::AllNodesFailed(_) => "protocol",
            Self::Decode { .. } => "decode",
            Self::Encode(_) => "encode",
            Self::Assembler(e) if e.is_not_ready() => "missing_field",
            Self::Assembler(_) => "decode",
            Self::NoShard(_) => "no_shard",
            Self::InvalidUrl(_) | Self::Config(_) => "config",
        }
    }

    /// The raw response attached to decode failures.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Decode { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Distinct failure messages, in first-seen order.
fn summarize(errors: &[RpcError]) -> String {
    let mut seen: Vec<String> = Vec::new();
    for message in errors.iter().map(ToString::to_string) {
        if !seen.contains(&message) {
            seen.push(message);
        }
    }
    seen.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_message_lists_distinct_failures() {
        let unreachable = RpcError::Transport(TransportError::Unreachable("a".into()));
        let err = RpcError::AllNodesFailed(vec![
            unreachable.clone(),
            unreachable,
            RpcError::Protocol {
                code: -32600,
                message: "bad".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "all nodes failed: transport error: node unreachable: a; node returned error -32600: bad"
        );
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn protocol_errors_are_final() {
        let err = RpcError::Protocol {
            code: 1,
            message: "x".into(),
        };
        assert!(!err.is_retryable());
        assert!(!RpcError::AllNodesFailed(vec![err.clone(), err]).is_retryable());
    }

    #[test]
    fn decode_error_keeps_raw_response() {
        let err = RpcError::Decode {
            reason: "missing `tx`".into(),
            raw: "{}".into(),
        };
        assert_eq!(err.raw_response(), Some("{}"));
        assert_eq!(err.kind(), "decode");
    }
}
