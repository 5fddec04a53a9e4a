// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), WebP (libwebp), and
// everything else (GIF, BMP, ICO) through the image crate.

use crate::engine::common::run_with_panic_policy;
use crate::error::ToolboxError;
use exif;
#[cfg(test)]
use image::GenericImageView;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::MAX_DIMENSION;

// Always ToolboxError so decode failures keep their category (CodecError, ResourceLimit).
type DecoderResult<T> = std::result::Result<T, ToolboxError>;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
/// This is SIGNIFICANTLY faster than image crate's pure Rust decoder
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ToolboxError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ToolboxError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        // Get image info
        let mut decompress = decompress.rgb().map_err(|e| {
            ToolboxError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();

        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(ToolboxError::decode_failed(format!(
                "image dimensions {}x{} exceed max {}",
                width, height, MAX_DIMENSION
            )));
        }
        let width_u32 = width as u32;
        let height_u32 = height as u32;
        check_dimensions(width_u32, height_u32)?;

        // Read all scanlines
        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ToolboxError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        // Safe conversion from Vec<[u8; 3]> to Vec<u8>
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        // Create DynamicImage from raw RGB data
        let rgb_image =
            RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
                ToolboxError::decode_failed("mozjpeg: failed to create image from raw data")
            })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode the remaining formats (GIF first frame, BMP, ICO largest entry) with the image crate.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        let img = image::load_from_memory(data).map_err(ToolboxError::from)?;
        check_dimensions(img.width(), img.height())?;
        Ok(img)
    })
}

/// Decode PNG using zune-png (SIMD decoder). 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| ToolboxError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| ToolboxError::decode_failed("png: missing header info"))?;

        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ToolboxError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ToolboxError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ToolboxError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| {
                        ToolboxError::decode_failed("png: failed to build RGBA image")
                    })?
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ToolboxError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| ToolboxError::decode_failed("png: failed to build LumaA image"))?,
            other => {
                return Err(ToolboxError::decode_failed(format!(
                    "png: unsupported colorspace {:?}",
                    other
                )))
            }
        };

        Ok(img)
    })
}

/// Decode WebP using libwebp (via webp crate). Falls back to image crate for animated WebP.
pub fn decode_webp_libwebp(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        // Parse header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            ToolboxError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            // libwebp simple decoder in this crate does not support animation; keep compatibility via fallback
            return image::load_from_memory(data).map_err(|e| {
                ToolboxError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        let width = features.width();
        let height = features.height();
        check_dimensions(width, height)?;

        let decoder = WebPDecoder::new(data);
        let decoded = decoder
            .decode()
            .ok_or_else(|| ToolboxError::decode_failed("webp: decode failed"))?;

        // The bitstream header can disagree with the decoded frame.
        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes)
/// - Route JPEG to mozjpeg, PNG to zune-png, WebP to libwebp, others to image crate
/// - Return decoded image and detected format
pub fn decode_image(bytes: &[u8]) -> DecoderResult<(DynamicImage, Option<ImageFormat>)> {
    if bytes.is_empty() {
        return Err(ToolboxError::decode_failed("empty input"));
    }
    let detected = detect_format(bytes);
    tracing::trace!(target: "imgtoolbox::decode", format = ?detected, len = bytes.len(), "routing decode");
    let img = match detected {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes)?,
        Some(ImageFormat::Png) => decode_png_zune(bytes)?,
        Some(ImageFormat::WebP) => decode_webp_libwebp(bytes)?,
        _ => decode_with_image_crate(bytes)?,
    };
    tracing::debug!(
        target: "imgtoolbox::decode",
        format = ?detected,
        width = img.width(),
        height = img.height(),
        "decoded"
    );
    Ok((img, detected))
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    use super::MAX_PIXELS;
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ToolboxError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ToolboxError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif_reader = exif::Reader::new();
    let exif = exif_reader.read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // exif crate can represent as Short/Long; use get_uint for safety
    let value = field.value.get_uint(0)?;
    let orientation = value as u16;
    if (1..=8).contains(&orientation) {
        Some(orientation)
    } else {
        None
    }
}
