//! Errors raised while parsing the shared value types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown transaction status: {0}")]
    UnknownStatus(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
