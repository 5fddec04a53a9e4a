#![no_main]

use imgtoolbox::engine::decode_image;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // Decoder panics are converted to errors; anything else is a bug.
    let _ = decode_image(data);
});
