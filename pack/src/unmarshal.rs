//! Binary decoding.
//!
//! Decoders return the unread remainder alongside the value so callers can
//! decode concatenated fields. [`unmarshal_exact`] is the top-level entry
//! that rejects trailing bytes.

use bridge_types::U256;

use crate::types::{PackType, MAX_DEPTH};
use crate::value::{PackValue, TypedValue};
use crate::DecodeError;

/// Decode one value of type `ty` from the front of `bytes`.
pub fn unmarshal<'a>(
    bytes: &'a [u8],
    ty: &PackType,
) -> Result<(PackValue, &'a [u8]), DecodeError> {
    let mut reader = Reader::new(bytes);
    let value = reader.value(ty, 0)?;
    Ok((value, reader.rest))
}

/// Decode a value that must span all of `bytes`.
pub fn unmarshal_exact(bytes: &[u8], ty: &PackType) -> Result<PackValue, DecodeError> {
    let (value, rest) = unmarshal(bytes, ty)?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingBytes(rest.len()));
    }
    Ok(value)
}

/// Decode a type descriptor from the front of `bytes`.
pub fn unmarshal_type(bytes: &[u8]) -> Result<(PackType, &[u8]), DecodeError> {
    let mut reader = Reader::new(bytes);
    let ty = reader.ty(0)?;
    Ok((ty, reader.rest))
}

/// Decode a self-describing payload (descriptor then value) that must span
/// all of `bytes`.
pub fn unmarshal_typed(bytes: &[u8]) -> Result<TypedValue, DecodeError> {
    let (ty, rest) = unmarshal_type(bytes)?;
    let value = unmarshal_exact(rest, &ty)?;
    Ok(TypedValue { ty, value })
}

struct Reader<'a> {
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.rest.len() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.rest.len(),
            });
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn len(&mut self) -> Result<usize, DecodeError> {
        Ok(u32::from_be_bytes(self.array::<4>()?) as usize)
    }

    fn len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let length = self.len()?;
        if length > self.rest.len() {
            return Err(DecodeError::LengthExceedsInput {
                length,
                remaining: self.rest.len(),
            });
        }
        self.take(length)
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.len_prefixed()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn ty(&mut self, depth: usize) -> Result<PackType, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::DepthExceeded(MAX_DEPTH));
        }
        let [tag] = self.array::<1>()?;
        if let Some(primitive) = PackType::primitive_from_tag(tag) {
            return Ok(primitive);
        }
        match tag {
            20 => {
                let count = self.len()?;
                // Each field needs at least a 4-byte name prefix and a tag.
                if count.saturating_mul(5) > self.rest.len() {
                    return Err(DecodeError::LengthExceedsInput {
                        length: count,
                        remaining: self.rest.len(),
                    });
                }
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = self.string()?;
                    let field_ty = self.ty(depth + 1)?;
                    fields.push((name, field_ty));
                }
                Ok(PackType::Struct(fields))
            }
            21 => Ok(PackType::list(self.ty(depth + 1)?)),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    fn value(&mut self, ty: &PackType, depth: usize) -> Result<PackValue, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::DepthExceeded(MAX_DEPTH));
        }
        Ok(match ty {
            PackType::Nil => PackValue::Nil,
            PackType::Bool => match self.array::<1>()? {
                [0] => PackValue::Bool(false),
                [1] => PackValue::Bool(true),
                [other] => {
                    return Err(DecodeError::InvalidValue {
                        ty: "bool".into(),
                        reason: format!("byte {other}"),
                    })
                }
            },
            PackType::Str => PackValue::Str(self.string()?),
            PackType::Bytes => PackValue::Bytes(self.len_prefixed()?.to_vec()),
            PackType::Bytes32 => PackValue::Bytes32(self.array::<32>()?),
            PackType::Bytes65 => PackValue::Bytes65(self.array::<65>()?),
            PackType::Struct(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (name, field_ty) in fields {
                    values.push((name.clone(), self.value(field_ty, depth + 1)?));
                }
                PackValue::Struct(values)
            }
            PackType::List(element) => {
                let count = self.len()?;
                let min = element.min_encoded_len().max(1);
                if count.saturating_mul(min) > self.rest.len() {
                    return Err(DecodeError::LengthExceedsInput {
                        length: count,
                        remaining: self.rest.len(),
                    });
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.value(element, depth + 1)?);
                }
                PackValue::List(items)
            }
            uint => {
                let width = uint.uint_bytes().unwrap_or(32);
                PackValue::UInt(U256::from_be_slice(self.take(width)?))
            }
        })
    }
}
