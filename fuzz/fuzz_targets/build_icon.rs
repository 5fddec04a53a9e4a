#![no_main]

use arbitrary::Arbitrary;
use image::{DynamicImage, RgbaImage};
use imgtoolbox::codecs::ico::read_directory;
use imgtoolbox::engine::build_icon;
use imgtoolbox::ops::IconOptions;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct IconInput {
    width: u8,
    height: u8,
    sizes: Vec<u16>,
    pixels: Vec<u8>,
}

fuzz_target!(|input: IconInput| {
    let width = input.width as u32 % 64 + 1;
    let height = input.height as u32 % 64 + 1;
    let mut buffer = vec![0u8; (width * height * 4) as usize];
    if !input.pixels.is_empty() {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = input.pixels[i % input.pixels.len()];
        }
    }
    let Some(rgba) = RgbaImage::from_raw(width, height, buffer) else {
        return;
    };
    // Keep renders small: edge lengths 0..=300, at most 6 entries.
    let sizes: Vec<u32> = input.sizes.iter().take(6).map(|s| *s as u32 % 301).collect();

    match build_icon(&DynamicImage::ImageRgba8(rgba), &sizes, IconOptions::default()) {
        Ok(icon) => {
            let entries = read_directory(icon.as_ref()).expect("built icon must parse");
            assert_eq!(entries.len(), sizes.len());
        }
        Err(_) => assert!(sizes.is_empty() || sizes.contains(&0)),
    }
});
