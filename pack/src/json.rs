//! JSON form of typed values, as exchanged with RPC nodes.
//!
//! Types: primitives are their names (`"u256"`, `"bytes32"`, ...), structs
//! are `{"struct": [{"name": type}, ...]}` and lists are `{"list": type}`.
//!
//! Values: integers of every width are decimal strings, byte strings are
//! unpadded URL-safe base64, structs are objects and lists are arrays.
//! Integers are also accepted as JSON numbers when decoding.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use bridge_types::amount::parse_decimal;
use bridge_types::encoding::{from_base64, to_base64};
use bridge_types::U256;

use crate::types::{PackType, MAX_DEPTH};
use crate::value::{PackValue, TypedValue};
use crate::{DecodeError, EncodeError};

pub fn type_to_json(ty: &PackType) -> Value {
    match ty {
        PackType::Struct(fields) => {
            let fields: Vec<Value> = fields
                .iter()
                .map(|(name, field_ty)| {
                    let mut entry = Map::new();
                    entry.insert(name.clone(), type_to_json(field_ty));
                    Value::Object(entry)
                })
                .collect();
            json!({ "struct": fields })
        }
        PackType::List(element) => json!({ "list": type_to_json(element) }),
        primitive => Value::String(primitive.name().to_string()),
    }
}

pub fn type_from_json(value: &Value) -> Result<PackType, DecodeError> {
    type_from_json_at(value, 0)
}

fn type_from_json_at(value: &Value, depth: usize) -> Result<PackType, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::DepthExceeded(MAX_DEPTH));
    }
    match value {
        Value::String(name) => PackType::primitive_from_name(name)
            .ok_or_else(|| DecodeError::InvalidType(format!("unknown type name {name:?}"))),
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::Array(entries)) = map.get("struct") {
                let mut fields = Vec::with_capacity(entries.len());
                for entry in entries {
                    let (name, field_ty) = single_entry(entry)?;
                    fields.push((name.clone(), type_from_json_at(field_ty, depth + 1)?));
                }
                Ok(PackType::Struct(fields))
            } else if let Some(element) = map.get("list") {
                Ok(PackType::list(type_from_json_at(element, depth + 1)?))
            } else {
                Err(DecodeError::InvalidType(format!("unknown compound type {value}")))
            }
        }
        other => Err(DecodeError::InvalidType(format!("unexpected {other}"))),
    }
}

fn single_entry(entry: &Value) -> Result<(&String, &Value), DecodeError> {
    match entry {
        Value::Object(map) if map.len() == 1 => map
            .iter()
            .next()
            .ok_or_else(|| DecodeError::InvalidType("empty struct field".into())),
        other => Err(DecodeError::InvalidType(format!(
            "struct field must be a single-entry object, got {other}"
        ))),
    }
}

pub fn value_to_json(ty: &PackType, value: &PackValue) -> Result<Value, EncodeError> {
    Ok(match (ty, value) {
        (PackType::Nil, PackValue::Nil) => Value::Null,
        (PackType::Bool, PackValue::Bool(b)) => Value::Bool(*b),
        (PackType::Str, PackValue::Str(s)) => Value::String(s.clone()),
        (PackType::Bytes, PackValue::Bytes(b)) => Value::String(to_base64(b)),
        (PackType::Bytes32, PackValue::Bytes32(b)) => Value::String(to_base64(b)),
        (PackType::Bytes65, PackValue::Bytes65(b)) => Value::String(to_base64(b)),
        (PackType::Struct(fields), PackValue::Struct(values)) => {
            if fields.len() != values.len() {
                return Err(EncodeError::FieldCount {
                    expected: fields.len(),
                    found: values.len(),
                });
            }
            let mut map = Map::new();
            for ((name, field_ty), (value_name, field_value)) in fields.iter().zip(values) {
                if name != value_name {
                    return Err(EncodeError::FieldMismatch {
                        expected: name.clone(),
                        found: value_name.clone(),
                    });
                }
                map.insert(name.clone(), value_to_json(field_ty, field_value)?);
            }
            Value::Object(map)
        }
        (PackType::List(element), PackValue::List(items)) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(element, item))
                .collect::<Result<_, _>>()?,
        ),
        (uint_ty, PackValue::UInt(v)) if uint_ty.uint_bytes().is_some() => {
            let width = uint_ty.uint_bytes().unwrap_or(32) * 8;
            if v.bit_len() > width {
                return Err(EncodeError::IntegerOverflow {
                    width,
                    value: v.to_string(),
                });
            }
            Value::String(v.to_string())
        }
        (ty, value) => {
            return Err(EncodeError::TypeMismatch {
                expected: ty.to_string(),
                found: value.kind().to_string(),
            })
        }
    })
}

pub fn value_from_json(ty: &PackType, value: &Value) -> Result<PackValue, DecodeError> {
    value_from_json_at(ty, value, 0)
}

fn invalid(ty: &PackType, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidValue {
        ty: ty.name().to_string(),
        reason: reason.into(),
    }
}

fn decode_bytes(ty: &PackType, value: &Value) -> Result<Vec<u8>, DecodeError> {
    let s = value
        .as_str()
        .ok_or_else(|| invalid(ty, format!("expected base64 string, got {value}")))?;
    from_base64(s).map_err(|e| invalid(ty, e.to_string()))
}

fn fixed<const N: usize>(ty: &PackType, value: &Value) -> Result<[u8; N], DecodeError> {
    let bytes = decode_bytes(ty, value)?;
    <[u8; N]>::try_from(bytes.as_slice())
        .map_err(|_| invalid(ty, format!("expected {N} bytes, got {}", bytes.len())))
}

fn value_from_json_at(
    ty: &PackType,
    value: &Value,
    depth: usize,
) -> Result<PackValue, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::DepthExceeded(MAX_DEPTH));
    }
    Ok(match ty {
        PackType::Nil => PackValue::Nil,
        PackType::Bool => PackValue::Bool(
            value
                .as_bool()
                .ok_or_else(|| invalid(ty, format!("expected bool, got {value}")))?,
        ),
        PackType::Str => PackValue::Str(
            value
                .as_str()
                .ok_or_else(|| invalid(ty, format!("expected string, got {value}")))?
                .to_string(),
        ),
        PackType::Bytes => PackValue::Bytes(decode_bytes(ty, value)?),
        PackType::Bytes32 => PackValue::Bytes32(fixed::<32>(ty, value)?),
        PackType::Bytes65 => PackValue::Bytes65(fixed::<65>(ty, value)?),
        PackType::Struct(fields) => {
            let map = value
                .as_object()
                .ok_or_else(|| invalid(ty, format!("expected object, got {value}")))?;
            let mut values = Vec::with_capacity(fields.len());
            for (name, field_ty) in fields {
                let field = map
                    .get(name)
                    .ok_or_else(|| DecodeError::MissingField(name.clone()))?;
                values.push((name.clone(), value_from_json_at(field_ty, field, depth + 1)?));
            }
            PackValue::Struct(values)
        }
        PackType::List(element) => {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(ty, format!("expected array, got {value}")))?;
            PackValue::List(
                items
                    .iter()
                    .map(|item| value_from_json_at(element, item, depth + 1))
                    .collect::<Result<_, _>>()?,
            )
        }
        uint_ty => {
            let width = uint_ty.uint_bytes().unwrap_or(32) * 8;
            let n = match value {
                Value::String(s) => parse_decimal(s).map_err(|e| invalid(ty, e.to_string()))?,
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| invalid(ty, format!("not an unsigned integer: {n}")))?,
                other => return Err(invalid(ty, format!("expected decimal string, got {other}"))),
            };
            if n.bit_len() > width {
                return Err(invalid(ty, format!("{n} does not fit in {width} bits")));
            }
            PackValue::UInt(n)
        }
    })
}

pub fn typed_to_json(typed: &TypedValue) -> Result<Value, EncodeError> {
    Ok(json!({
        "t": type_to_json(&typed.ty),
        "v": value_to_json(&typed.ty, &typed.value)?,
    }))
}

pub fn typed_from_json(value: &Value) -> Result<TypedValue, DecodeError> {
    let t = value
        .get("t")
        .ok_or_else(|| DecodeError::Json("typed value is missing `t`".into()))?;
    let ty = type_from_json(t)?;
    let v = value.get("v").unwrap_or(&Value::Null);
    let value = value_from_json(&ty, v)?;
    Ok(TypedValue { ty, value })
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        typed_to_json(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        typed_from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_type() -> PackType {
        PackType::structure([
            ("amount", PackType::U256),
            ("txindex", PackType::U32),
            ("sig", PackType::Bytes65),
            ("revert", PackType::Str),
        ])
    }

    #[test]
    fn type_json_shape() {
        let ty = PackType::structure([("xs", PackType::list(PackType::U8))]);
        assert_eq!(
            type_to_json(&ty),
            json!({"struct": [{"xs": {"list": "u8"}}]})
        );
        assert_eq!(type_from_json(&type_to_json(&ty)).unwrap(), ty);
    }

    #[test]
    fn parses_node_output() {
        let raw = json!({
            "t": {"struct": [
                {"amount": "u256"},
                {"txindex": "u32"},
                {"sig": "bytes65"},
                {"revert": "string"}
            ]},
            "v": {
                "amount": "99000",
                "txindex": 0,
                "sig": to_base64(&[1u8; 65]),
                "revert": ""
            }
        });
        let typed: TypedValue = serde_json::from_value(raw).unwrap();
        assert_eq!(typed.ty, output_type());
        assert_eq!(typed.value.field("amount"), Some(&PackValue::uint(99_000)));
        assert_eq!(typed.value.field("txindex"), Some(&PackValue::uint(0)));
    }

    #[test]
    fn integers_serialise_as_strings() {
        let typed = TypedValue::new(PackType::U64, PackValue::uint(u64::MAX));
        assert_eq!(
            typed_to_json(&typed).unwrap(),
            json!({"t": "u64", "v": u64::MAX.to_string()})
        );
    }

    #[test]
    fn missing_struct_field_is_reported() {
        let err = value_from_json(&output_type(), &json!({"amount": "1"})).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("txindex".into()));
    }

    #[test]
    fn wrong_fixed_length_is_rejected() {
        let err = value_from_json(&PackType::Bytes32, &json!(to_base64(&[0u8; 31])));
        assert!(matches!(err, Err(DecodeError::InvalidValue { .. })));
    }

    #[test]
    fn out_of_width_integer_is_rejected() {
        assert!(value_from_json(&PackType::U8, &json!("256")).is_err());
        assert!(value_from_json(&PackType::U8, &json!("255")).is_ok());
        assert!(value_from_json(&PackType::U32, &json!(-1)).is_err());
        assert!(value_from_json(&PackType::U256, &json!("12abc")).is_err());
    }

    #[test]
    fn unknown_type_names_are_rejected() {
        assert!(type_from_json(&json!("float")).is_err());
        assert!(type_from_json(&json!({"tuple": []})).is_err());
        assert!(type_from_json(&json!({"struct": [{"a": "u8", "b": "u8"}]})).is_err());
    }

    #[test]
    fn typed_value_round_trips_through_json() {
        let typed = TypedValue::new(
            output_type(),
            PackValue::structure([
                ("amount", PackValue::UInt(U256::MAX)),
                ("txindex", PackValue::uint(3)),
                ("sig", PackValue::Bytes65([7; 65])),
                ("revert", PackValue::Str("nope".into())),
            ]),
        );
        let json = serde_json::to_value(&typed).unwrap();
        let back: TypedValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, typed);
    }
}
