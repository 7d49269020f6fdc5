//! Byte-string encodings used on the custody-network wire.
//!
//! Every byte field travels as unpadded URL-safe base64. Decoding also
//! accepts padded input because some nodes emit it.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;

use crate::TypesError;

/// Encode bytes as unpadded URL-safe base64.
pub fn to_base64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode URL-safe base64, with or without padding.
pub fn from_base64(s: &str) -> Result<Vec<u8>, TypesError> {
    let result = if s.ends_with('=') {
        URL_SAFE.decode(s)
    } else {
        URL_SAFE_NO_PAD.decode(s)
    };
    result.map_err(|e| TypesError::InvalidBase64(e.to_string()))
}

/// Decode URL-safe base64 into a fixed-size array.
pub fn from_base64_array<const N: usize>(s: &str) -> Result<[u8; N], TypesError> {
    let bytes = from_base64(s)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| TypesError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

/// Serde adapter for `Vec<u8>` fields stored as base64 strings.
pub mod serde_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_base64(&s).map_err(serde::de::Error::custom)
    }
}
