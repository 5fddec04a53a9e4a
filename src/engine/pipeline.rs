// src/engine/pipeline.rs
//
// Pipeline operations: apply_ops, optimize_ops, resize calculations and the
// fast_image_resize wrapper every other module resizes through.

use crate::engine::check_dimensions;
use crate::engine::compose;
use crate::error::ToolboxError;
use crate::ops::{Operation, ResizeFit};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use std::borrow::Cow;

// Always ToolboxError so pipeline failures keep their category.
type PipelineResult<T> = std::result::Result<T, ToolboxError>;

/// Brightness and contrast are clamped to this range.
pub const ADJUST_RANGE: std::ops::RangeInclusive<i32> = -100..=100;

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }
}

impl From<ResizeError> for ToolboxError {
    fn from(err: ResizeError) -> Self {
        ToolboxError::resize_failed(err.source_dims, err.target_dims, err.reason)
    }
}

/// Calculate resize dimensions maintaining aspect ratio (fit = inside semantics)
pub fn calc_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: Option<u32>,
    target_h: Option<u32>,
) -> (u32, u32) {
    match (target_w, target_h) {
        (Some(w), Some(h)) => {
            let orig_ratio = orig_w as f64 / orig_h as f64;
            let target_ratio = w as f64 / h as f64;

            if orig_ratio > target_ratio {
                // wider than the box: width is the binding side
                let ratio = w as f64 / orig_w as f64;
                (w, (orig_h as f64 * ratio).round() as u32)
            } else {
                let ratio = h as f64 / orig_h as f64;
                ((orig_w as f64 * ratio).round() as u32, h)
            }
        }
        (Some(w), None) => {
            let ratio = w as f64 / orig_w as f64;
            (w, (orig_h as f64 * ratio).round() as u32)
        }
        (None, Some(h)) => {
            let ratio = h as f64 / orig_h as f64;
            ((orig_w as f64 * ratio).round() as u32, h)
        }
        (None, None) => (orig_w, orig_h),
    }
}

/// Like `calc_resize_dimensions` with both sides set, but never upscales and
/// never collapses a side to zero.
pub fn calc_fit_within(orig_w: u32, orig_h: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    if orig_w <= box_w && orig_h <= box_h {
        return (orig_w, orig_h);
    }
    let (w, h) = calc_resize_dimensions(orig_w, orig_h, Some(box_w), Some(box_h));
    (w.clamp(1, box_w.max(1)), h.clamp(1, box_h.max(1)))
}

fn validate_resize_dimensions(width: u32, height: u32) -> PipelineResult<()> {
    if width == 0 || height == 0 {
        return Err(ToolboxError::invalid_resize_dimensions(
            Some(width),
            Some(height),
        ));
    }
    check_dimensions(width, height)
}

/// Normalize a rotation to 0, 90, 180 or 270.
pub fn normalize_rotation(degrees: i32) -> PipelineResult<i32> {
    if degrees % 90 != 0 {
        return Err(ToolboxError::invalid_rotation_angle(degrees));
    }
    Ok(degrees.rem_euclid(360))
}

/// Merge consecutive resizes with the same fit and drop no-op rotations.
pub fn optimize_ops(ops: &[Operation]) -> Vec<Operation> {
    let mut optimized: Vec<Operation> = Vec::with_capacity(ops.len());

    for op in ops {
        match op {
            Operation::Rotate { degrees } if matches!(normalize_rotation(*degrees), Ok(0)) => {
                continue;
            }
            Operation::Resize {
                width: w2,
                height: h2,
                fit: fit2,
            } => {
                if let Some(Operation::Resize { width, height, fit }) = optimized.last_mut() {
                    if fit == fit2 {
                        // A later resize with both sides wins outright; a single side
                        // re-derives the other from the aspect ratio.
                        if w2.is_some() && h2.is_some() {
                            *width = *w2;
                            *height = *h2;
                        } else if w2.is_some() {
                            *width = *w2;
                            *height = None;
                        } else if h2.is_some() {
                            *width = None;
                            *height = *h2;
                        }
                        continue;
                    }
                }
                optimized.push(op.clone());
            }
            _ => optimized.push(op.clone()),
        }
    }

    optimized
}

/// Apply all queued operations using Copy-on-Write semantics.
///
/// With no effective operations the input is returned as `Cow::Borrowed` and no
/// pixel data is copied. Otherwise the image is materialized once and every
/// operation works on the owned buffer.
pub fn apply_ops<'a>(
    img: Cow<'a, DynamicImage>,
    ops: &[Operation],
) -> PipelineResult<Cow<'a, DynamicImage>> {
    let optimized_ops = optimize_ops(ops);
    if optimized_ops.is_empty() {
        return Ok(img);
    }

    tracing::trace!(
        target: "imgtoolbox::pipeline",
        ops = optimized_ops.len(),
        width = img.width(),
        height = img.height(),
        "materializing for ops"
    );
    let mut img = img.into_owned();

    for op in &optimized_ops {
        img = apply_op(img, op)?;
    }
    Ok(Cow::Owned(img))
}

fn normalize_for_resize(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

fn apply_op(img: DynamicImage, op: &Operation) -> PipelineResult<DynamicImage> {
    let out = match op {
        Operation::Resize { width, height, fit } => {
            let (w, h) = match (fit, width, height) {
                (ResizeFit::Fill, Some(w), Some(h)) => (*w, *h),
                _ => calc_resize_dimensions(img.width(), img.height(), *width, *height),
            };
            validate_resize_dimensions(w, h)?;
            if (w, h) == (img.width(), img.height()) {
                img
            } else {
                fast_resize_owned(normalize_for_resize(img), w, h)?
            }
        }

        Operation::Crop {
            x,
            y,
            width,
            height,
        } => {
            if *width == 0 || *height == 0 {
                return Err(ToolboxError::invalid_crop_dimensions(*width, *height));
            }
            let img_w = img.width();
            let img_h = img.height();
            let fits_x = x.checked_add(*width).is_some_and(|end| end <= img_w);
            let fits_y = y.checked_add(*height).is_some_and(|end| end <= img_h);
            if !fits_x || !fits_y {
                return Err(ToolboxError::invalid_crop_bounds(
                    *x, *y, *width, *height, img_w, img_h,
                ));
            }
            img.crop_imm(*x, *y, *width, *height)
        }

        Operation::Rotate { degrees } => match normalize_rotation(*degrees)? {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        },

        Operation::FlipH => img.fliph(),
        Operation::FlipV => img.flipv(),
        Operation::Grayscale => DynamicImage::ImageLuma8(img.to_luma8()),

        Operation::Brightness { value } => {
            img.brighten((*value).clamp(*ADJUST_RANGE.start(), *ADJUST_RANGE.end()))
        }

        Operation::Contrast { value } => {
            let value = (*value).clamp(*ADJUST_RANGE.start(), *ADJUST_RANGE.end());
            img.adjust_contrast(value as f32)
        }

        Operation::AutoOrient { orientation } => match orientation {
            2 => img.fliph(),
            3 => img.rotate180(),
            4 => img.flipv(),
            5 => img.rotate90().fliph(), // transpose
            6 => img.rotate90(),
            7 => img.rotate270().fliph(), // transverse
            8 => img.rotate270(),
            _ => img,
        },

        Operation::TextWatermark(mark) => compose::draw_text_watermark(img, mark)?,
        Operation::ImageWatermark(mark) => compose::draw_image_watermark(img, mark)?,
    };
    Ok(out)
}

/// Fast resize with owned DynamicImage (zero-copy for RGB/RGBA)
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // into_raw() hands over the buffer instead of copying it
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    fast_resize_internal_impl(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

/// Fast resize from a borrowed image. The source is copied once.
pub fn fast_resize(
    img: &DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let owned = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img.clone(),
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    };
    fast_resize_owned(owned, dst_width, dst_height)
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Decide whether alpha premultiplication is required for a given pixel layout.
#[inline]
fn requires_premultiply(pixel_type: PixelType) -> bool {
    matches!(pixel_type, PixelType::U8x4)
}

fn fast_resize_internal_impl(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let options = default_resize_options();
    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(&src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, pixel_type);
            aligned
                .buffer_mut()
                .copy_from_slice(&src_pixels[..required_bytes]);
            resize_with_source_image(&aligned, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => {
            tracing::warn!(target: "imgtoolbox::pipeline", error = %err, "fast resize failed, using image crate");
            resize_with_image_crate_fallback(
                &src_pixels,
                src_width,
                src_height,
                pixel_type,
                dst_width,
                dst_height,
            )
            .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
        }
    }
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(image::imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(image::imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

/// Fully opaque RGBA can skip premultiply. Only images of 1MP and up are
/// scanned; below that premultiplying is cheaper than the scan.
fn is_fully_opaque(image: &fir::images::Image, pixel_type: PixelType, width: u32, height: u32) -> bool {
    if pixel_type != PixelType::U8x4 {
        return true;
    }
    const THRESHOLD_PIXELS: u64 = 1_000_000;
    if (width as u64).saturating_mul(height as u64) < THRESHOLD_PIXELS {
        return false;
    }
    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

// The source buffer is left untouched so the image crate fallback sees straight alpha.
fn resize_with_source_image(
    src_image: &fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let src_width = src_image.width();
    let src_height = src_image.height();
    let needs_premultiply = requires_premultiply(pixel_type)
        && !is_fully_opaque(src_image, pixel_type, src_width, src_height);

    let mul_div = MulDiv::default();
    let premultiplied = if needs_premultiply {
        let mut premultiplied = fir::images::Image::new(src_width, src_height, pixel_type);
        mul_div
            .multiply_alpha(src_image, &mut premultiplied)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
        Some(premultiplied)
    } else {
        None
    };

    let mut resizer = fir::Resizer::new();
    let resize_result = match &premultiplied {
        Some(premultiplied) => resizer.resize(premultiplied, &mut dst_image, options),
        None => resizer.resize(src_image, &mut dst_image, options),
    };
    resize_result.map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to create rgb image from resized data".to_string()),
        PixelType::U8x4 => RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to create rgba image from resized data".to_string()),
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Color;
    use crate::ops::{Anchor, Placement, TextWatermark};
    use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
    use std::borrow::Cow;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn create_test_image_rgba(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    fn resize(width: Option<u32>, height: Option<u32>, fit: ResizeFit) -> Operation {
        Operation::Resize { width, height, fit }
    }

    fn run(img: DynamicImage, ops: &[Operation]) -> PipelineResult<DynamicImage> {
        apply_ops(Cow::Owned(img), ops).map(Cow::into_owned)
    }

    mod resize_calc_tests {
        use super::*;

        #[test]
        fn test_both_dimensions_fit_inside() {
            assert_eq!(calc_resize_dimensions(1000, 800, Some(500), Some(400)), (500, 400));
            assert_eq!(calc_resize_dimensions(2000, 1000, Some(500), Some(500)), (500, 250));
            assert_eq!(calc_resize_dimensions(1000, 2000, Some(500), Some(500)), (250, 500));
        }

        #[test]
        fn test_single_side_maintains_aspect_ratio() {
            assert_eq!(calc_resize_dimensions(1000, 500, Some(500), None), (500, 250));
            assert_eq!(calc_resize_dimensions(1000, 500, None, Some(250)), (500, 250));
        }

        #[test]
        fn test_none_returns_original() {
            assert_eq!(calc_resize_dimensions(1000, 500, None, None), (1000, 500));
        }

        #[test]
        fn test_rounding_behavior() {
            // 101:51 ≈ 50:25.2 → 25
            assert_eq!(calc_resize_dimensions(101, 51, Some(50), None), (50, 25));
        }

        #[test]
        fn test_fit_within_never_upscales() {
            assert_eq!(calc_fit_within(10, 20, 100, 100), (10, 20));
            assert_eq!(calc_fit_within(400, 100, 100, 100), (100, 25));
            assert_eq!(calc_fit_within(10_000, 1, 100, 100), (100, 1));
        }

        #[test]
        fn test_normalize_rotation() {
            assert_eq!(normalize_rotation(-90).unwrap(), 270);
            assert_eq!(normalize_rotation(450).unwrap(), 90);
            assert_eq!(normalize_rotation(-360).unwrap(), 0);
            assert!(normalize_rotation(45).is_err());
        }
    }

    mod resize_fallback_tests {
        use super::*;

        fn generate_pixels(count: usize) -> Vec<u8> {
            (0..count).map(|i| (i % 251) as u8).collect()
        }

        #[test]
        fn image_crate_fallback_resizes_rgb_and_rgba() {
            let rgb = generate_pixels(8 * 4 * 3);
            let resized =
                resize_with_image_crate_fallback(&rgb, 8, 4, PixelType::U8x3, 4, 2).unwrap();
            assert_eq!(resized.dimensions(), (4, 2));
            assert!(matches!(resized, DynamicImage::ImageRgb8(_)));

            let rgba = generate_pixels(6 * 3 * 4);
            let resized =
                resize_with_image_crate_fallback(&rgba, 6, 3, PixelType::U8x4, 3, 2).unwrap();
            assert_eq!(resized.dimensions(), (3, 2));
            assert!(matches!(resized, DynamicImage::ImageRgba8(_)));
        }

        #[test]
        fn short_buffer_is_an_error() {
            assert!(fast_resize_internal_impl(4, 4, vec![0u8; 10], PixelType::U8x3, 2, 2).is_err());
        }
    }

    mod apply_ops_tests {
        use super::*;

        #[test]
        fn test_resize_inside_and_fill() {
            let img = create_test_image(100, 50);
            let inside = run(img.clone(), &[resize(Some(40), Some(40), ResizeFit::Inside)]).unwrap();
            assert_eq!(inside.dimensions(), (40, 20));
            let fill = run(img, &[resize(Some(40), Some(40), ResizeFit::Fill)]).unwrap();
            assert_eq!(fill.dimensions(), (40, 40));
        }

        #[test]
        fn test_resize_to_zero_is_rejected() {
            let img = create_test_image(100, 1);
            let err = run(img, &[resize(Some(10), None, ResizeFit::Inside)]).unwrap_err();
            assert!(matches!(err, ToolboxError::InvalidResizeDimensions { .. }));
        }

        #[test]
        fn test_resize_beyond_max_dimension_is_rejected() {
            let img = create_test_image(10, 10);
            let too_big = crate::engine::MAX_DIMENSION + 1;
            let err = run(img, &[resize(Some(too_big), Some(1), ResizeFit::Fill)]).unwrap_err();
            assert!(matches!(err, ToolboxError::DimensionExceedsLimit { .. }));
        }

        #[test]
        fn test_crop_valid_and_out_of_bounds() {
            let img = create_test_image(100, 100);
            let ok = run(
                img.clone(),
                &[Operation::Crop {
                    x: 10,
                    y: 10,
                    width: 50,
                    height: 50,
                }],
            )
            .unwrap();
            assert_eq!(ok.dimensions(), (50, 50));

            let err = run(
                img.clone(),
                &[Operation::Crop {
                    x: 60,
                    y: 60,
                    width: 50,
                    height: 50,
                }],
            )
            .unwrap_err();
            assert!(matches!(err, ToolboxError::InvalidCropBounds { .. }));

            let err = run(
                img,
                &[Operation::Crop {
                    x: u32::MAX,
                    y: 0,
                    width: 2,
                    height: 1,
                }],
            )
            .unwrap_err();
            assert!(matches!(err, ToolboxError::InvalidCropBounds { .. }));
        }

        #[test]
        fn test_crop_zero_size() {
            let img = create_test_image(10, 10);
            let err = run(
                img,
                &[Operation::Crop {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 5,
                }],
            )
            .unwrap_err();
            assert!(matches!(err, ToolboxError::InvalidCropDimensions { .. }));
        }

        #[test]
        fn test_rotations() {
            let img = create_test_image(100, 50);
            for (degrees, dims) in [(90, (50, 100)), (180, (100, 50)), (-90, (50, 100)), (360, (100, 50))] {
                let out = run(img.clone(), &[Operation::Rotate { degrees }]).unwrap();
                assert_eq!(out.dimensions(), dims, "rotate {degrees}");
            }
            let err = run(img, &[Operation::Rotate { degrees: 45 }]).unwrap_err();
            assert!(matches!(err, ToolboxError::InvalidRotationAngle { degrees: 45 }));
        }

        #[test]
        fn test_auto_orient() {
            let img = create_test_image(100, 50);
            let rotated = run(img.clone(), &[Operation::AutoOrient { orientation: 6 }]).unwrap();
            assert_eq!(rotated.dimensions(), (50, 100));
            let flipped = run(img.clone(), &[Operation::AutoOrient { orientation: 2 }]).unwrap();
            assert_eq!(
                flipped.to_rgb8().get_pixel(0, 0),
                img.to_rgb8().get_pixel(99, 0)
            );
        }

        #[test]
        fn test_flips() {
            let img = create_test_image(4, 4);
            let h = run(img.clone(), &[Operation::FlipH]).unwrap().to_rgb8();
            assert_eq!(h.get_pixel(0, 0).0, [3, 0, 128]);
            let v = run(img, &[Operation::FlipV]).unwrap().to_rgb8();
            assert_eq!(v.get_pixel(0, 0).0, [0, 3, 128]);
        }

        #[test]
        fn test_grayscale_reduces_channels() {
            let img = create_test_image(10, 10);
            let out = run(img, &[Operation::Grayscale]).unwrap();
            assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        }

        #[test]
        fn test_brightness_is_clamped() {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([100, 100, 100])));
            let out = run(img, &[Operation::Brightness { value: 1000 }]).unwrap();
            assert_eq!(out.to_rgb8().get_pixel(0, 0).0, [200, 200, 200]);
        }

        #[test]
        fn test_contrast_keeps_dimensions() {
            let img = create_test_image(10, 10);
            let out = run(img, &[Operation::Contrast { value: -500 }]).unwrap();
            assert_eq!(out.dimensions(), (10, 10));
        }

        #[test]
        fn test_text_watermark_goes_through_pipeline() {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, image::Rgb([0, 0, 0])));
            let mut mark = TextWatermark::new("A");
            mark.color = Color::WHITE;
            mark.opacity = 1.0;
            mark.scale = 1;
            mark.placement = Placement::Anchored {
                anchor: Anchor::TopLeft,
                margin: 0,
            };
            let out = run(img, &[Operation::TextWatermark(mark)]).unwrap();
            assert_eq!(out.dimensions(), (64, 32));
            let lit = out
                .to_rgba8()
                .pixels()
                .filter(|p| p[0] == 255)
                .count();
            assert!(lit > 0);
        }

        #[test]
        fn test_chained_operations() {
            let img = create_test_image_rgba(200, 100);
            let out = run(
                img,
                &[
                    resize(Some(100), None, ResizeFit::Inside),
                    Operation::Rotate { degrees: 90 },
                    Operation::Crop {
                        x: 0,
                        y: 0,
                        width: 50,
                        height: 50,
                    },
                ],
            )
            .unwrap();
            assert_eq!(out.dimensions(), (50, 50));
        }

        #[test]
        fn test_empty_operations_borrow() {
            let img = create_test_image(10, 10);
            let out = apply_ops(Cow::Borrowed(&img), &[]).unwrap();
            assert!(matches!(out, Cow::Borrowed(_)));
            let out = apply_ops(Cow::Borrowed(&img), &[Operation::Rotate { degrees: 0 }]).unwrap();
            assert!(matches!(out, Cow::Borrowed(_)));
        }
    }

    mod optimize_ops_tests {
        use super::*;

        #[test]
        fn test_consecutive_resizes_combined() {
            let ops = vec![
                resize(Some(800), Some(600), ResizeFit::Inside),
                resize(Some(400), Some(300), ResizeFit::Inside),
                resize(None, Some(100), ResizeFit::Inside),
            ];
            let optimized = optimize_ops(&ops);
            assert_eq!(optimized.len(), 1);
            match &optimized[0] {
                Operation::Resize { width, height, .. } => {
                    assert_eq!(*width, None);
                    assert_eq!(*height, Some(100));
                }
                other => panic!("expected resize, got {other:?}"),
            }
        }

        #[test]
        fn test_different_fits_not_combined() {
            let ops = vec![
                resize(Some(800), Some(600), ResizeFit::Inside),
                resize(Some(400), Some(300), ResizeFit::Fill),
            ];
            assert_eq!(optimize_ops(&ops).len(), 2);
        }

        #[test]
        fn test_non_consecutive_resizes_not_combined() {
            let ops = vec![
                resize(Some(800), None, ResizeFit::Inside),
                Operation::Grayscale,
                resize(Some(400), None, ResizeFit::Inside),
            ];
            assert_eq!(optimize_ops(&ops).len(), 3);
        }

        #[test]
        fn test_noop_rotations_dropped() {
            let ops = vec![
                Operation::Rotate { degrees: 0 },
                Operation::Rotate { degrees: 360 },
                Operation::Rotate { degrees: 90 },
            ];
            let optimized = optimize_ops(&ops);
            assert_eq!(optimized.len(), 1);
            assert!(matches!(optimized[0], Operation::Rotate { degrees: 90 }));
        }
    }

    mod fast_resize_tests {
        use super::*;

        #[test]
        fn test_fast_resize_dimensions() {
            let img = create_test_image(200, 100);
            assert_eq!(fast_resize(&img, 100, 50).unwrap().dimensions(), (100, 50));
            assert_eq!(fast_resize(&img, 400, 400).unwrap().dimensions(), (400, 400));
            assert_eq!(fast_resize(&img, 200, 100).unwrap().dimensions(), (200, 100));
        }

        #[test]
        fn test_fast_resize_invalid_dimensions() {
            let img = create_test_image(1, 1);
            let err = fast_resize_owned(img, 0, 10).expect_err("expected resize failure");
            assert_eq!(err.source_dims, (1, 1));
            assert_eq!(err.target_dims, (0, 10));
            assert!(err.reason.contains("invalid dimensions"));
        }

        #[test]
        fn test_fast_resize_converts_luma_to_rgba() {
            let img = DynamicImage::ImageLuma8(image::GrayImage::new(8, 8));
            let out = fast_resize(&img, 4, 4).unwrap();
            assert!(matches!(out, DynamicImage::ImageRgba8(_)));
        }

        #[test]
        fn test_requires_premultiply_only_for_rgba() {
            assert!(requires_premultiply(PixelType::U8x4));
            assert!(!requires_premultiply(PixelType::U8x3));
        }

        #[test]
        fn test_fast_resize_rgba_respects_transparency_when_downscaling() {
            // Opaque red next to transparent blue: premultiply keeps blue from bleeding in.
            let mut rgba = RgbaImage::new(2, 1);
            rgba.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
            rgba.put_pixel(1, 0, image::Rgba([0, 0, 255, 0]));

            let resized = fast_resize(&DynamicImage::ImageRgba8(rgba), 1, 1).unwrap();
            let pixel = *resized.to_rgba8().get_pixel(0, 0);
            assert!(pixel[0] > 200, "red channel should dominate, got {}", pixel[0]);
            assert!(pixel[2] < 30, "blue channel should be minimal, got {}", pixel[2]);
            assert!(pixel[3] > 100, "alpha should remain non-zero, got {}", pixel[3]);
        }

        #[test]
        fn test_resize_with_source_image_keeps_source_straight_alpha() {
            // The image crate fallback reads the same buffer after a failed fir resize.
            let original: Vec<u8> = (0..4 * 4)
                .flat_map(|i| [200, 100, 50, (i * 16) as u8])
                .collect();
            let mut pixels = original.clone();
            {
                let src =
                    fir::images::Image::from_slice_u8(4, 4, pixels.as_mut_slice(), PixelType::U8x4)
                        .unwrap();
                let out = resize_with_source_image(
                    &src,
                    PixelType::U8x4,
                    2,
                    2,
                    &default_resize_options(),
                )
                .unwrap();
                assert_eq!(out.dimensions(), (2, 2));
            }
            assert_eq!(pixels, original);
        }

        #[test]
        fn test_is_fully_opaque_thresholds() {
            let mut small = vec![255u8; 512 * 512 * 4];
            let image =
                fir::images::Image::from_slice_u8(512, 512, small.as_mut_slice(), PixelType::U8x4)
                    .unwrap();
            assert!(!is_fully_opaque(&image, PixelType::U8x4, 512, 512));

            let mut large = vec![255u8; 1000 * 1000 * 4];
            let image =
                fir::images::Image::from_slice_u8(1000, 1000, large.as_mut_slice(), PixelType::U8x4)
                    .unwrap();
            assert!(is_fully_opaque(&image, PixelType::U8x4, 1000, 1000));
        }

        #[test]
        fn test_fast_resize_inside_rayon_pool() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .expect("failed to build test pool");

            pool.install(|| {
                let img = create_test_image_rgba(256, 256);
                let out = fast_resize(&img, 64, 64).unwrap();
                assert_eq!(out.dimensions(), (64, 64));
            });
        }
    }
}
