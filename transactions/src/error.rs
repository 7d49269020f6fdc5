use thiserror::Error;

use bridge_pack::{DecodeError, EncodeError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    /// The field is absent from `out`, `autogen` and `in`. Usually means the
    /// network has not finished executing the transaction.
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` has unexpected type: expected {expected}, found {found}")]
    FieldType {
        field: String,
        expected: String,
        found: String,
    },

    #[error("numeric field `{0}` does not round-trip")]
    NumericRoundTrip(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl AssemblerError {
    /// Whether re-querying later may succeed.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::MissingField(_))
    }
}
