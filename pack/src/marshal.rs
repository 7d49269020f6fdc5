//! Binary encoding.

use crate::types::PackType;
use crate::value::{PackValue, TypedValue};
use crate::EncodeError;

/// Encode `value` as `ty`.
pub fn marshal(ty: &PackType, value: &PackValue) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    marshal_into(&mut out, ty, value)?;
    Ok(out)
}

/// Encode a self-describing payload: the type descriptor followed by the value.
pub fn marshal_typed(typed: &TypedValue) -> Result<Vec<u8>, EncodeError> {
    let mut out = marshal_type(&typed.ty)?;
    marshal_into(&mut out, &typed.ty, &typed.value)?;
    Ok(out)
}

/// Length-prefixed string.
pub fn marshal_string(s: &str) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(4 + s.len());
    put_len_prefixed(&mut out, s.as_bytes())?;
    Ok(out)
}

/// Encode a type descriptor.
pub fn marshal_type(ty: &PackType) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    marshal_type_into(&mut out, ty)?;
    Ok(out)
}

fn marshal_type_into(out: &mut Vec<u8>, ty: &PackType) -> Result<(), EncodeError> {
    out.push(ty.tag());
    match ty {
        PackType::Struct(fields) => {
            put_len(out, fields.len())?;
            for (name, field_ty) in fields {
                put_len_prefixed(out, name.as_bytes())?;
                marshal_type_into(out, field_ty)?;
            }
        }
        PackType::List(element) => marshal_type_into(out, element)?,
        _ => {}
    }
    Ok(())
}

fn marshal_into(out: &mut Vec<u8>, ty: &PackType, value: &PackValue) -> Result<(), EncodeError> {
    match (ty, value) {
        (PackType::Nil, PackValue::Nil) => {}
        (PackType::Bool, PackValue::Bool(b)) => out.push(u8::from(*b)),
        (PackType::Str, PackValue::Str(s)) => put_len_prefixed(out, s.as_bytes())?,
        (PackType::Bytes, PackValue::Bytes(b)) => put_len_prefixed(out, b)?,
        (PackType::Bytes32, PackValue::Bytes32(b)) => out.extend_from_slice(b),
        (PackType::Bytes65, PackValue::Bytes65(b)) => out.extend_from_slice(b),
        (PackType::Struct(fields), PackValue::Struct(values)) => {
            if fields.len() != values.len() {
                return Err(EncodeError::FieldCount {
                    expected: fields.len(),
                    found: values.len(),
                });
            }
            for ((name, field_ty), (value_name, field_value)) in fields.iter().zip(values) {
                if name != value_name {
                    return Err(EncodeError::FieldMismatch {
                        expected: name.clone(),
                        found: value_name.clone(),
                    });
                }
                marshal_into(out, field_ty, field_value)?;
            }
        }
        (PackType::List(element), PackValue::List(items)) => {
            put_len(out, items.len())?;
            for item in items {
                marshal_into(out, element, item)?;
            }
        }
        (uint_ty, PackValue::UInt(v)) if uint_ty.uint_bytes().is_some() => {
            let width = uint_ty.uint_bytes().unwrap_or(32);
            if v.bit_len() > width * 8 {
                return Err(EncodeError::IntegerOverflow {
                    width: width * 8,
                    value: v.to_string(),
                });
            }
            let bytes = v.to_be_bytes::<32>();
            out.extend_from_slice(&bytes[32 - width..]);
        }
        (ty, value) => {
            return Err(EncodeError::TypeMismatch {
                expected: ty.to_string(),
                found: value.kind().to_string(),
            })
        }
    }
    Ok(())
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let len = u32::try_from(len).map_err(|_| EncodeError::LengthOverflow(len))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), EncodeError> {
    put_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}
