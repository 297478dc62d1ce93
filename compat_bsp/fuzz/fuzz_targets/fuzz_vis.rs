#![no_main]

use compat_bsp::visibility;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(rows) = visibility::decompress(data) {
        let _ = visibility::compress(&rows);
    }
});
