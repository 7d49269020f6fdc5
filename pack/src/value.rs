//! Pack values.

use bridge_types::U256;

use crate::types::PackType;

/// A Pack value. Integers of every width are held as `U256`; the paired
/// [`PackType`] fixes the width on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackValue {
    Nil,
    Bool(bool),
    UInt(U256),
    Str(String),
    Bytes(Vec<u8>),
    Bytes32([u8; 32]),
    Bytes65([u8; 65]),
    Struct(Vec<(String, PackValue)>),
    List(Vec<PackValue>),
}

impl PackValue {
    /// Build a struct value from `(name, value)` pairs, keeping their order.
    pub fn structure<N, I>(fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, PackValue)>,
    {
        Self::Struct(fields.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    pub fn uint(value: u64) -> Self {
        Self::UInt(U256::from(value))
    }

    /// Short name of the value's variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::UInt(_) => "uint",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Bytes32(_) => "bytes32",
            Self::Bytes65(_) => "bytes65",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
        }
    }

    pub fn field(&self, name: &str) -> Option<&PackValue> {
        match self {
            Self::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Byte content of any byte-string variant.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Bytes32(b) => Some(b),
            Self::Bytes65(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PackValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// A value together with its type: the unit that crosses the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedValue {
    pub ty: PackType,
    pub value: PackValue,
}

impl TypedValue {
    pub fn new(ty: PackType, value: PackValue) -> Self {
        Self { ty, value }
    }

    /// Look up a struct field together with its declared type.
    pub fn field(&self, name: &str) -> Option<(&PackType, &PackValue)> {
        Some((self.ty.field(name)?, self.value.field(name)?))
    }
}
