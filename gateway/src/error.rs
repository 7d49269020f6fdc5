use thiserror::Error;

use bridge_chains::ChainError;
use bridge_crypto::CryptoError;
use bridge_rpc::RpcError;
use bridge_transactions::AssemblerError;
use bridge_utils::Cancelled;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{chain} does not support asset {asset}")]
    UnsupportedAsset { asset: String, chain: String },

    #[error("no chain registered as {0}")]
    UnsupportedChain(String),

    #[error("invalid {chain} address {address:?}")]
    InvalidAddress { chain: String, address: String },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("transaction error: {0}")]
    Assembler(#[from] AssemblerError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The signature does not recover to the shard key. Never retried.
    #[error("signature mismatch: expected signer {expected}, recovered {recovered}")]
    SignatureMismatch { expected: String, recovered: String },

    /// The network answered with the output of another transfer. Never retried.
    #[error("output belongs to nhash {returned}, expected {expected}")]
    WrongTransaction { expected: String, returned: String },

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("no signature after {0} polls")]
    SignatureTimeout(u32),

    #[error("no burn found for nonce {0}")]
    BurnNotFound(String),

    #[error("session expired")]
    Expired,

    #[error("cancelled")]
    Cancelled,

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),

    /// The transaction is in `Errored` and needs an explicit retry.
    #[error("transaction needs intervention: {0}")]
    Errored(String),

    #[error("transaction {0} is not errored")]
    NotErrored(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("task failed: {0}")]
    Task(String),
}

impl GatewayError {
    /// Whether the failed step may succeed if run again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_retryable() || e.is_not_found(),
            Self::Chain(e) => e.is_retryable(),
            Self::Assembler(e) => e.is_not_ready(),
            Self::SignatureTimeout(_) => true,
            _ => false,
        }
    }

    /// Short machine-readable classification, stored in error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedAsset { .. } => "unsupported_asset",
            Self::UnsupportedChain(_) => "unsupported_chain",
            Self::InvalidAddress { .. } | Self::InvalidParams(_) => "invalid_params",
            Self::Rpc(e) => e.kind(),
            Self::Chain(e) if e.is_retryable() => "transport",
            Self::Chain(_) => "chain",
            Self::Assembler(e) if e.is_not_ready() => "missing_field",
            Self::Assembler(_) => "decode",
            Self::Crypto(_) => "crypto",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::WrongTransaction { .. } => "wrong_transaction",
            Self::Reverted(_) => "reverted",
            Self::SignatureTimeout(_) => "timeout",
            Self::BurnNotFound(_) => "not_found",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::UnknownTransaction(_) | Self::NotErrored(_) => "invalid_request",
            Self::Errored(_) => "errored",
            Self::Config(_) => "config",
            Self::Task(_) => "task",
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Rpc(e) => e.raw_response(),
            _ => None,
        }
    }
}

impl From<Cancelled> for GatewayError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl GatewayError {
    /// A failed signer check; a mismatch becomes [`GatewayError::SignatureMismatch`].
    pub(crate) fn from_signer_check(e: CryptoError) -> Self {
        match e {
            CryptoError::SignerMismatch {
                expected,
                recovered,
            } => Self::SignatureMismatch {
                expected,
                recovered,
            },
            other => Self::Crypto(other),
        }
    }
}
