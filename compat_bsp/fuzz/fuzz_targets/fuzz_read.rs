#![no_main]

use compat_bsp::Bsp;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(bsp) = Bsp::from_bytes(data.to_vec()) else {
        return;
    };
    let _ = bsp.load_all();
    let _ = bsp.to_bytes();
});
