use proptest::prelude::*;

use bridge_pack::json::{typed_from_json, typed_to_json};
use bridge_pack::{marshal, marshal_typed, unmarshal, unmarshal_exact, unmarshal_typed};
use bridge_pack::{PackType, PackValue, TypedValue};
use bridge_types::U256;

fn uint_of(bytes: usize) -> impl Strategy<Value = PackValue> {
    prop::collection::vec(any::<u8>(), bytes)
        .prop_map(|b| PackValue::UInt(U256::from_be_slice(&b)))
}

fn leaf() -> impl Strategy<Value = TypedValue> {
    prop_oneof![
        Just(TypedValue::new(PackType::Nil, PackValue::Nil)),
        any::<bool>().prop_map(|b| TypedValue::new(PackType::Bool, PackValue::Bool(b))),
        uint_of(1).prop_map(|v| TypedValue::new(PackType::U8, v)),
        uint_of(2).prop_map(|v| TypedValue::new(PackType::U16, v)),
        uint_of(4).prop_map(|v| TypedValue::new(PackType::U32, v)),
        uint_of(8).prop_map(|v| TypedValue::new(PackType::U64, v)),
        uint_of(16).prop_map(|v| TypedValue::new(PackType::U128, v)),
        uint_of(32).prop_map(|v| TypedValue::new(PackType::U256, v)),
        ".{0,16}".prop_map(|s| TypedValue::new(PackType::Str, PackValue::Str(s))),
        prop::collection::vec(any::<u8>(), 0..48)
            .prop_map(|b| TypedValue::new(PackType::Bytes, PackValue::Bytes(b))),
        prop::array::uniform32(any::<u8>())
            .prop_map(|b| TypedValue::new(PackType::Bytes32, PackValue::Bytes32(b))),
        (prop::array::uniform32(any::<u8>()), prop::array::uniform32(any::<u8>()), any::<u8>())
            .prop_map(|(a, b, c)| {
                let mut sig = [0u8; 65];
                sig[..32].copy_from_slice(&a);
                sig[32..64].copy_from_slice(&b);
                sig[64] = c;
                TypedValue::new(PackType::Bytes65, PackValue::Bytes65(sig))
            }),
    ]
}

fn typed_value() -> impl Strategy<Value = TypedValue> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|fields| {
                let (types, values): (Vec<_>, Vec<_>) = fields
                    .into_iter()
                    .enumerate()
                    .map(|(i, tv)| ((format!("f{i}"), tv.ty), (format!("f{i}"), tv.value)))
                    .unzip();
                TypedValue::new(PackType::Struct(types), PackValue::Struct(values))
            }),
            (inner, 0usize..4).prop_map(|(tv, n)| {
                TypedValue::new(
                    PackType::list(tv.ty),
                    PackValue::List(std::iter::repeat(tv.value).take(n).collect()),
                )
            }),
        ]
    })
}

proptest! {
    /// Binary encoding round-trips for every type.
    #[test]
    fn binary_roundtrip(tv in typed_value()) {
        let bytes = marshal(&tv.ty, &tv.value).unwrap();
        prop_assert_eq!(unmarshal_exact(&bytes, &tv.ty).unwrap(), tv.value);
    }

    /// Self-describing payloads round-trip, descriptor included.
    #[test]
    fn typed_binary_roundtrip(tv in typed_value()) {
        let bytes = marshal_typed(&tv).unwrap();
        prop_assert_eq!(unmarshal_typed(&bytes).unwrap(), tv);
    }

    /// JSON form round-trips for every type.
    #[test]
    fn json_roundtrip(tv in typed_value()) {
        let json = typed_to_json(&tv).unwrap();
        prop_assert_eq!(typed_from_json(&json).unwrap(), tv);
    }

    /// Encoding is canonical: both forms agree after a JSON round trip.
    #[test]
    fn encoding_is_canonical(tv in typed_value()) {
        let direct = marshal(&tv.ty, &tv.value).unwrap();
        let via_json = typed_from_json(&typed_to_json(&tv).unwrap()).unwrap();
        prop_assert_eq!(marshal(&via_json.ty, &via_json.value).unwrap(), direct);
    }

    /// Decoding arbitrary bytes never panics, and any value decoded with a
    /// remainder re-encodes to exactly the consumed prefix.
    #[test]
    fn decode_arbitrary_bytes(tv in typed_value(), bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        if let Ok((value, rest)) = unmarshal(&bytes, &tv.ty) {
            let consumed = bytes.len() - rest.len();
            prop_assert_eq!(marshal(&tv.ty, &value).unwrap(), bytes[..consumed].to_vec());
        }
    }
}
