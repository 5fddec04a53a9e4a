// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp),
// GIF and BMP (image crate).

use crate::engine::color::Color;
use crate::engine::common::run_with_panic_policy;
use crate::error::ToolboxError;
use crate::ops::OutputFormat;
use image::{DynamicImage, ImageFormat, RgbImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

use crate::engine::MAX_DIMENSION;

// Always ToolboxError so encode failures keep their category.
type EncoderResult<T> = std::result::Result<T, ToolboxError>;

/// oxipng preset used when PNG optimization is requested.
const OXIPNG_PRESET: u8 = 2;

/// Single source of truth for deriving per-format encoder knobs from a 0-100 quality.
/// Bands:
/// - High (>=85): visual quality first
/// - Balanced (70-84)
/// - Fast (50-69)
/// - Fastest (<50)
///
/// WebP filter_strength keeps its own 80/60 thresholds.
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn is_lossless(&self) -> bool {
        self.quality >= 100.0
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    /// Method 4 is libwebp's speed/quality midpoint.
    pub fn webp_method(&self) -> i32 {
        4
    }

    /// Single pass: multi-pass is several times slower for little gain.
    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_preprocessing(&self) -> i32 {
        0
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        match self.band() {
            QualityBand::High if self.quality >= 90.0 => 0,
            QualityBand::High | QualityBand::Balanced => 5,
            QualityBand::Fast if self.quality >= 60.0 => 10,
            QualityBand::Fast | QualityBand::Fastest => 18,
        }
    }
}

fn ensure_not_empty(format: &'static str, data: Vec<u8>) -> EncoderResult<Vec<u8>> {
    if data.is_empty() {
        return Err(ToolboxError::encode_failed(format, "encoder produced no data"));
    }
    Ok(data)
}

/// Composite an image onto an opaque background (alpha "over" blend).
/// Images without alpha are converted without blending.
pub fn flatten_onto(img: &DynamicImage, background: Color) -> Cow<'_, RgbImage> {
    if let DynamicImage::ImageRgb8(rgb) = img {
        return Cow::Borrowed(rgb);
    }
    if !img.color().has_alpha() {
        return Cow::Owned(img.to_rgb8());
    }
    let rgba = img.to_rgba8();
    let bg = [background.r, background.g, background.b];
    Cow::Owned(RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let a = p[3] as u32;
        let mut out = [0u8; 3];
        for c in 0..3 {
            out[c] = ((p[c] as u32 * a + bg[c] as u32 * (255 - a) + 127) / 255) as u8;
        }
        image::Rgb(out)
    }))
}

/// Encode to JPEG using mozjpeg: progressive, optimized Huffman tables.
/// Transparent pixels are flattened onto `background`.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, background: Color) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);
        let rgb = flatten_onto(img, background);
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        // Reject inputs that would make libjpeg abort.
        if w == 0 || h == 0 {
            return Err(ToolboxError::encode_failed(
                "jpeg",
                "invalid image dimensions: width or height is zero",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ToolboxError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }
        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ToolboxError::corrupted_image());
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ToolboxError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ToolboxError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ToolboxError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        ensure_not_empty("jpeg", output)
    })
}

/// Encode to PNG using the image crate, optionally recompressed by oxipng (lossless).
pub fn encode_png(img: &DynamicImage, optimize: bool) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ToolboxError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let buf = ensure_not_empty("png", buf)?;
        if !optimize {
            return Ok(buf);
        }

        let options = oxipng::Options::from_preset(OXIPNG_PRESET);
        let optimized = oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ToolboxError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })?;
        ensure_not_empty("png", optimized)
    })
}

/// Encode to WebP with libwebp. Alpha is kept when present; quality 100 is lossless.
pub fn encode_webp(img: &DynamicImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let settings = QualitySettings::new(quality);
        let has_alpha = img.color().has_alpha();

        // Keep the pixel buffer alive for the encoder's borrow.
        let (pixels, w, h) = if has_alpha {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            (rgba.into_raw(), w, h)
        } else {
            let rgb = flatten_onto(img, Color::WHITE).into_owned();
            let (w, h) = rgb.dimensions();
            (rgb.into_raw(), w, h)
        };
        let encoder = if has_alpha {
            webp::Encoder::from_rgba(&pixels, w, h)
        } else {
            webp::Encoder::from_rgb(&pixels, w, h)
        };

        let mut config = webp::WebPConfig::new()
            .map_err(|_| ToolboxError::internal_panic("failed to create WebPConfig"))?;

        if settings.is_lossless() {
            config.lossless = 1;
            config.quality = 100.0;
        } else {
            config.quality = settings.quality();
            config.sns_strength = settings.webp_sns_strength();
            config.autofilter = 1;
            config.filter_strength = settings.webp_filter_strength();
            config.filter_sharpness = settings.webp_filter_sharpness();
        }
        config.method = settings.webp_method();
        config.pass = settings.webp_pass();
        config.preprocessing = settings.webp_preprocessing();

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            ToolboxError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;

        ensure_not_empty("webp", mem.to_vec())
    })
}

/// Encode a single-frame GIF (palette quantized by the image crate).
pub fn encode_gif(img: &DynamicImage) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
        let mut buf = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
            .map_err(|e| ToolboxError::encode_failed("gif", format!("GIF encode failed: {e}")))?;
        ensure_not_empty("gif", buf)
    })
}

/// Encode to uncompressed BMP (32-bit when the source has alpha).
pub fn encode_bmp(img: &DynamicImage) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:bmp", || {
        let normalized: Cow<'_, DynamicImage> = match img {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(img),
            _ if img.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
            _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
        };
        let mut buf = Vec::new();
        normalized
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)
            .map_err(|e| ToolboxError::encode_failed("bmp", format!("BMP encode failed: {e}")))?;
        ensure_not_empty("bmp", buf)
    })
}

/// Encode `img` in the requested output format.
pub fn encode(img: &DynamicImage, format: &OutputFormat) -> EncoderResult<Vec<u8>> {
    let encoded = match format {
        OutputFormat::Jpeg {
            quality,
            background,
        } => encode_jpeg(img, *quality, *background),
        OutputFormat::Png { optimize } => encode_png(img, *optimize),
        OutputFormat::WebP { quality } => encode_webp(img, *quality),
        OutputFormat::Gif => encode_gif(img),
        OutputFormat::Bmp => encode_bmp(img),
    }?;
    tracing::debug!(
        target: "imgtoolbox::encode",
        format = format.name(),
        width = img.width(),
        height = img.height(),
        bytes = encoded.len(),
        "encoded"
    );
    Ok(encoded)
}
