#![no_main]

use libfuzzer_sys::fuzz_target;

use bridge_pack::{marshal_typed, unmarshal_type, unmarshal_typed};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic.
    let _ = unmarshal_type(data);

    // Anything that decodes must re-encode to the same bytes.
    if let Ok(typed) = unmarshal_typed(data) {
        let encoded = marshal_typed(&typed).expect("decoded value must re-encode");
        assert_eq!(encoded, data);
    }
});
