// src/engine.rs
//
// The core of imgtoolbox. Decoding, per-image operations, composition, ICO/GIF
// assembly and output all live in the modules under engine/; this file holds
// the global limits and the public re-exports.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod animation;
pub mod api;
pub mod color;
mod common;
pub mod compose;
pub mod decoder;
pub mod encoder;
pub mod icon;
pub mod io;
pub mod limits;
pub mod pipeline;
pub mod pool;
pub mod tasks;

pub use animation::{ExtractedFrame, GifOptions};
pub use api::{collage, extract_frames, make_gif, ImageTool};
pub use color::{average_color, pick_color, Color};
pub use compose::{compose_collage, CollageLayout, CollageOptions};
pub use decoder::{check_dimensions, decode_image, detect_format};
pub use encoder::{encode, encode_jpeg, encode_png, encode_webp, QualitySettings};
pub use icon::build_icon;
pub use io::{write_atomic, Source};
pub use limits::{InputLimits, LimitPolicy};
pub use pipeline::{apply_ops, calc_resize_dimensions, fast_resize, optimize_ops, ResizeError};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{IconOptions, OutputFormat};
    use image::{DynamicImage, GenericImageView, RgbaImage};

    #[test]
    fn limits_are_consistent() {
        assert!((MAX_DIMENSION as u64) * (MAX_DIMENSION as u64) > MAX_PIXELS);
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(check_dimensions(MAX_DIMENSION + 1, 1).is_err());
        assert!(check_dimensions(20_000, 20_000).is_err());
    }

    #[test]
    fn facade_round_trip() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            24,
            24,
            image::Rgba([200, 10, 10, 255]),
        ));
        let png = encode(&img, &OutputFormat::Png { optimize: false }).unwrap();
        let tool = ImageTool::from_bytes(png);
        assert_eq!(tool.decode().unwrap().dimensions(), (24, 24));
        let icon = tool.to_ico(&[16], IconOptions::default()).unwrap();
        assert_eq!(icon.mime_type(), "image/x-icon");
    }
}
