#![no_main]

use compat_bsp::detect_with_key;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = detect_with_key(data);
});
