//! Pack type descriptors.

use std::fmt;

/// Maximum nesting of struct/list descriptors accepted by the decoders.
pub const MAX_DEPTH: usize = 32;

/// The shape of a Pack value.
///
/// Struct field order is part of the type: two structs with the same
/// fields in a different order encode differently.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PackType {
    Nil,
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    Str,
    Bytes,
    Bytes32,
    Bytes65,
    Struct(Vec<(String, PackType)>),
    List(Box<PackType>),
}

impl PackType {
    /// Build a struct type from `(name, type)` pairs, keeping their order.
    pub fn structure<N, I>(fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, PackType)>,
    {
        Self::Struct(fields.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }

    pub fn list(element: PackType) -> Self {
        Self::List(Box::new(element))
    }

    /// Binary descriptor tag.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::Bool => 1,
            Self::U8 => 2,
            Self::U16 => 3,
            Self::U32 => 4,
            Self::U64 => 5,
            Self::U128 => 6,
            Self::U256 => 7,
            Self::Str => 10,
            Self::Bytes => 11,
            Self::Bytes32 => 12,
            Self::Bytes65 => 13,
            Self::Struct(_) => 20,
            Self::List(_) => 21,
        }
    }

    /// Primitive type for a descriptor tag. Compound tags return `None`.
    pub fn primitive_from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Nil,
            1 => Self::Bool,
            2 => Self::U8,
            3 => Self::U16,
            4 => Self::U32,
            5 => Self::U64,
            6 => Self::U128,
            7 => Self::U256,
            10 => Self::Str,
            11 => Self::Bytes,
            12 => Self::Bytes32,
            13 => Self::Bytes65,
            _ => return None,
        })
    }

    /// JSON name of a primitive type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::U128 => "u128",
            Self::U256 => "u256",
            Self::Str => "string",
            Self::Bytes => "bytes",
            Self::Bytes32 => "bytes32",
            Self::Bytes65 => "bytes65",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
        }
    }

    pub fn primitive_from_name(name: &str) -> Option<Self> {
        Some(match name {
            "nil" => Self::Nil,
            "bool" => Self::Bool,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "u128" => Self::U128,
            "u256" => Self::U256,
            "string" => Self::Str,
            "bytes" => Self::Bytes,
            "bytes32" => Self::Bytes32,
            "bytes65" => Self::Bytes65,
            _ => return None,
        })
    }

    /// Width in bytes of an unsigned integer type.
    pub fn uint_bytes(&self) -> Option<usize> {
        match self {
            Self::U8 => Some(1),
            Self::U16 => Some(2),
            Self::U32 => Some(4),
            Self::U64 => Some(8),
            Self::U128 => Some(16),
            Self::U256 => Some(32),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&PackType> {
        match self {
            Self::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, t)| t),
            _ => None,
        }
    }

    /// Whether a value of this type can be read as `expected`.
    ///
    /// Primitives must match exactly. Structs may carry extra fields, but
    /// every field of `expected` must be present with a conforming type.
    pub fn conforms_to(&self, expected: &PackType) -> bool {
        match (self, expected) {
            (Self::Struct(_), Self::Struct(want)) => want.iter().all(|(name, want_ty)| {
                self.field(name)
                    .map(|have| have.conforms_to(want_ty))
                    .unwrap_or(false)
            }),
            (Self::List(have), Self::List(want)) => have.conforms_to(want),
            (have, want) => have == want,
        }
    }

    /// Fewest bytes any value of this type can occupy.
    pub fn min_encoded_len(&self) -> usize {
        match self {
            Self::Nil => 0,
            Self::Bool => 1,
            Self::Str | Self::Bytes | Self::List(_) => 4,
            Self::Bytes32 => 32,
            Self::Bytes65 => 65,
            Self::Struct(fields) => fields.iter().map(|(_, t)| t.min_encoded_len()).sum(),
            uint => uint.uint_bytes().unwrap_or(0),
        }
    }
}

impl fmt::Display for PackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str("}")
            }
            Self::List(element) => write!(f, "list<{element}>"),
            primitive => f.write_str(primitive.name()),
        }
    }
}
