//! Pack: the typed value encoding spoken by custody-network nodes.
//!
//! Every value travels with a [`PackType`] describing its shape. The same
//! typed value has two forms:
//!
//! - a canonical **binary** form ([`marshal`] / [`unmarshal`]), used for
//!   transaction hashing, and
//! - a **JSON** form (`{"t": type, "v": value}`, see [`json`]), used on the
//!   JSON-RPC wire.
//!
//! Decoding is strict in both forms: truncated input, length prefixes that
//! run past the end, unknown tags and out-of-range integers are all errors.

pub mod error;
pub mod json;
pub mod marshal;
pub mod types;
pub mod unmarshal;
pub mod value;

pub use error::{DecodeError, EncodeError};
pub use marshal::{marshal, marshal_string, marshal_type, marshal_typed};
pub use types::PackType;
pub use unmarshal::{unmarshal, unmarshal_exact, unmarshal_type, unmarshal_typed};
pub use value::{PackValue, TypedValue};
