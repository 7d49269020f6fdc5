use proptest::prelude::*;

use bridge_types::{Amount, Hash32, Selector, U256};

proptest! {
    /// Hash32 base64 roundtrip.
    #[test]
    fn hash_base64_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash32::new(bytes);
        let decoded = Hash32::from_base64(&hash.to_base64()).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// Hash32::is_zero is true only for all-zero bytes.
    #[test]
    fn hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash32::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Decimal string form of any 256-bit amount parses back to itself.
    #[test]
    fn amount_decimal_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let amount = Amount::new(U256::from_be_bytes(bytes));
        let parsed: Amount = amount.to_string().parse().unwrap();
        prop_assert_eq!(parsed, amount);
    }

    /// Every well-formed selector prints back to the same string.
    #[test]
    fn selector_string_roundtrip(
        asset in "[A-Z]{2,5}",
        from in "[A-Z][a-z]{2,10}",
        to in "[A-Z][a-z]{2,10}",
        native_to_from in any::<bool>(),
        native_to_to in any::<bool>(),
    ) {
        let sel = Selector::for_transfer(&asset, &from, &to, native_to_from, native_to_to).unwrap();
        let parsed: Selector = sel.to_string().parse().unwrap();
        prop_assert_eq!(parsed, sel);
    }
}
