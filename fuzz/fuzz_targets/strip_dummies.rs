#![no_main]

use bitcoin::{consensus, Transaction};
use covault_oracle::strip_dummy_signatures;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a consensus-encoded transaction.
    // Placeholder stripping must never panic, and stripping twice must
    // leave the transaction exactly where one strip put it.
    if let Ok(mut tx) = consensus::deserialize::<Transaction>(data) {
        if strip_dummy_signatures(&mut tx).is_ok() {
            let once = tx.clone();
            strip_dummy_signatures(&mut tx).expect("second strip must succeed");
            assert_eq!(tx, once);
        }
    }
});
