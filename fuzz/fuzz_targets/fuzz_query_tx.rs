#![no_main]

use libfuzzer_sys::fuzz_target;

use bridge_rpc::responses::parse_query_tx;
use bridge_transactions::{unmarshal_burn_output, unmarshal_mint_output};

fuzz_target!(|data: &[u8]| {
    // Node replies are untrusted: parsing and output extraction may fail
    // but must never panic.
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if let Ok(response) = parse_query_tx(&value) {
        let _ = response.hash_matches();
        let _ = unmarshal_mint_output(&response);
        let _ = unmarshal_burn_output(&response);
    }
});
