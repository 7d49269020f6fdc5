#![no_main]

use libfuzzer_sys::fuzz_target;

use bridge_pack::json::{typed_from_json, typed_to_json};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    // A typed value that parses must survive the trip back to JSON.
    if let Ok(typed) = typed_from_json(&value) {
        let json = typed_to_json(&typed).expect("decoded value must re-encode");
        assert_eq!(typed_from_json(&json).ok(), Some(typed));
    }
});
