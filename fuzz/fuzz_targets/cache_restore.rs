#![no_main]

use covault_core::DerivationCache;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a persisted cache snapshot.
    // restore must never panic — it should always return Ok or Err.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(cache) = DerivationCache::restore(s) {
            // An accepted snapshot must round-trip losslessly.
            let snapshot = cache.snapshot().unwrap();
            assert_eq!(DerivationCache::restore(&snapshot).unwrap(), cache);
        }
    }
});
