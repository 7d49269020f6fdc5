//! Asset amounts.
//!
//! Amounts are unsigned 256-bit integers in the asset's smallest unit. They
//! travel on the wire as decimal strings, never as JSON numbers, so no
//! precision is lost for values above 2^53.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// An asset amount in its smallest unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn new(raw: U256) -> Self {
        Self(raw)
    }

    pub fn from_u128(raw: u128) -> Self {
        Self(U256::from(raw))
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Big-endian 32-byte representation.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(U256::from_be_bytes(bytes))
    }
}

/// Parse a strict base-10 string into a `U256`.
///
/// Rejects signs, whitespace, separators and anything that overflows.
pub fn parse_decimal(s: &str) -> Result<U256, TypesError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TypesError::InvalidAmount(s.to_string()));
    }
    U256::from_str_radix(s, 10).map_err(|_| TypesError::InvalidAmount(s.to_string()))
}

impl From<u128> for Amount {
    fn from(raw: u128) -> Self {
        Self::from_u128(raw)
    }
}

impl From<U256> for Amount {
    fn from(raw: U256) -> Self {
        Self(raw)
    }
}

impl FromStr for Amount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("1000".parse::<Amount>().unwrap(), Amount::from_u128(1000));
        assert_eq!("0".parse::<Amount>().unwrap(), Amount::ZERO);
    }

    #[test]
    fn rejects_non_decimal() {
        for bad in ["", "-1", "1_000", " 1", "0x10", "1.5"] {
            assert!(bad.parse::<Amount>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overflow() {
        let too_big = format!("{}0", U256::MAX);
        assert!(too_big.parse::<Amount>().is_err());
        assert!(U256::MAX.to_string().parse::<Amount>().is_ok());
    }

    #[test]
    fn be_bytes_are_left_padded() {
        let bytes = Amount::from_u128(1000).to_be_bytes();
        assert_eq!(&bytes[..30], &[0u8; 30]);
        assert_eq!(&bytes[30..], &[0x03, 0xe8]);
        assert_eq!(Amount::from_be_bytes(bytes), Amount::from_u128(1000));
    }

    #[test]
    fn serde_uses_decimal_string() {
        let amount = Amount::from_u128(u128::MAX);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let small = Amount::from_u128(5);
        let big = Amount::from_u128(10);
        assert_eq!(small.saturating_sub(big), Amount::ZERO);
        assert_eq!(small.checked_sub(big), None);
    }
}
