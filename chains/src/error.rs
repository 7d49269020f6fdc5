use thiserror::Error;

use crate::types::OutputReference;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Temporary failure (RPC hiccup, mempool full, nonce race).
    #[error("transient chain error: {0}")]
    Transient(String),

    #[error("chain error: {0}")]
    Fatal(String),

    /// The destination already holds this mint. Treated as success.
    #[error("already submitted as {0}")]
    AlreadySubmitted(OutputReference),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),
}

impl ChainError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
