#![no_main]

use covault_core::HdPath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Try parsing arbitrary bytes as a UTF-8 string, then as a chain path.
    // HdPath parsing must never panic — it should always return Ok or Err.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(path) = s.parse::<HdPath>() {
            // A parsed path must round-trip through its display form.
            let shown = path.to_string();
            let again: HdPath = shown.parse().expect("display form must parse");
            assert_eq!(path, again);
        }
    }
});
