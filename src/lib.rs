// lib.rs
//
// imgtoolbox: image utilities for desktop and Node.js tooling
//
// - Multi-resolution ICO generation
// - Format conversion (JPEG / PNG / WebP / GIF / BMP)
// - Resize, crop, rotate, flip, brightness/contrast, grayscale
// - Text and image watermarks, collages
// - Color picking, GIF generation and frame extraction

#[cfg(feature = "napi")]
#[macro_use]
extern crate napi_derive;

// jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod codecs;
pub mod engine;
pub mod error;
pub mod ops;

use error::ToolboxError;
use image::ImageReader;
#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

pub use engine::ImageTool;

/// Header-level facts about an image; no pixels are decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

fn read_inspect_metadata<R: BufRead + Seek>(
    reader: R,
) -> std::result::Result<InspectMetadata, ToolboxError> {
    let reader = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(|e| ToolboxError::decode_failed(format!("failed to read image header: {e}")))?;

    let format = reader.format().map(|f| format!("{:?}", f).to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ToolboxError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

pub fn inspect_header_from_bytes(
    data: &[u8],
) -> std::result::Result<InspectMetadata, ToolboxError> {
    read_inspect_metadata(Cursor::new(data))
}

pub fn inspect_header_from_path(
    path: impl AsRef<Path>,
) -> std::result::Result<InspectMetadata, ToolboxError> {
    use std::fs::File;

    let path = path.as_ref();
    let display = path.to_string_lossy().into_owned();
    if !path.exists() {
        return Err(ToolboxError::file_not_found(display));
    }
    let file = File::open(path).map_err(|e| ToolboxError::file_read_failed(display, e))?;
    read_inspect_metadata(BufReader::new(file))
}

/// Input formats the decoder accepts.
pub const SUPPORTED_INPUT_FORMATS: &[&str] = &["jpeg", "jpg", "png", "webp", "gif", "bmp", "ico"];

/// Output formats `OutputFormat::from_str` accepts.
pub const SUPPORTED_OUTPUT_FORMATS: &[&str] = &["jpeg", "jpg", "png", "webp", "gif", "bmp"];

#[cfg(feature = "napi")]
/// Image metadata returned by inspect()
#[napi(object)]
pub struct ImageMetadata {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Detected format (jpeg, png, webp, gif, etc.)
    pub format: Option<String>,
}

#[cfg(feature = "napi")]
impl From<InspectMetadata> for ImageMetadata {
    fn from(value: InspectMetadata) -> Self {
        Self {
            width: value.width,
            height: value.height,
            format: value.format,
        }
    }
}

#[cfg(feature = "napi")]
/// Inspect image metadata WITHOUT decoding pixels.
#[napi]
pub fn inspect(buffer: Buffer) -> Result<ImageMetadata> {
    Ok(inspect_header_from_bytes(buffer.as_ref())?.into())
}

#[cfg(feature = "napi")]
/// Get library version
#[napi]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(feature = "napi")]
/// Get supported input formats
#[napi]
pub fn supported_input_formats() -> Vec<String> {
    SUPPORTED_INPUT_FORMATS.iter().map(|s| s.to_string()).collect()
}

#[cfg(feature = "napi")]
/// Get supported output formats
#[napi]
pub fn supported_output_formats() -> Vec<String> {
    SUPPORTED_OUTPUT_FORMATS.iter().map(|s| s.to_string()).collect()
}
