use thiserror::Error;

/// A value could not be encoded against its declared type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("integer {value} does not fit in {width} bits")]
    IntegerOverflow { width: usize, value: String },

    #[error("struct field mismatch: expected `{expected}`, found `{found}`")]
    FieldMismatch { expected: String, found: String },

    #[error("struct has {found} fields, type declares {expected}")]
    FieldCount { expected: usize, found: usize },

    #[error("length {0} exceeds the 32-bit length prefix")]
    LengthOverflow(usize),
}

/// Input bytes or JSON could not be decoded into the requested type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("length prefix {length} exceeds remaining {remaining} bytes")]
    LengthExceedsInput { length: usize, remaining: usize },

    #[error("unknown type tag {0}")]
    UnknownTag(u8),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("type nesting exceeds {0} levels")]
    DepthExceeded(usize),

    #[error("missing struct field `{0}`")]
    MissingField(String),

    #[error("invalid {ty} value: {reason}")]
    InvalidValue { ty: String, reason: String },

    #[error("invalid type descriptor: {0}")]
    InvalidType(String),

    #[error("invalid JSON: {0}")]
    Json(String),
}
