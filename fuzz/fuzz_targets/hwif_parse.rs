#![no_main]

use covault_core::KeyNode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary strings as base58 extended keys.
    // KeyNode::from_hwif must never panic — it should always return Ok or Err.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(node) = KeyNode::from_hwif(s) {
            // An accepted key must serialize back to the same string.
            assert_eq!(node.to_hwif(), s);
        }
    }
});
