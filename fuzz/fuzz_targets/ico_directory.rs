#![no_main]

use imgtoolbox::codecs::ico::{payload, read_directory};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(entries) = read_directory(data) else {
        return;
    };
    for entry in &entries {
        // A validated entry must always address a slice inside the buffer.
        let slice = payload(data, entry).expect("validated entry out of bounds");
        assert_eq!(slice.len(), entry.size as usize);
    }
});
