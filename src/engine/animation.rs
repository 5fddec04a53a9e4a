// src/engine/animation.rs
//
// GIF generation from still images and frame extraction from animated GIFs.

use crate::codecs::gif::{decode_animation, encode_animation, AnimationFrame};
use crate::engine::check_dimensions;
use crate::engine::decoder::detect_format;
use crate::engine::encoder::encode_png;
use crate::engine::pipeline::{calc_fit_within, fast_resize};
use crate::error::ToolboxError;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, RgbaImage};

type AnimationResult<T> = std::result::Result<T, ToolboxError>;

pub const DEFAULT_FRAME_DELAY_MS: u32 = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GifOptions {
    /// Canvas width; defaults to the first image's width.
    pub width: Option<u32>,
    /// Canvas height; defaults to the first image's height.
    pub height: Option<u32>,
    /// Per-frame delay. GIF counts in centiseconds, so this is rounded to the
    /// nearest 10 ms (15 becomes 20) and capped at 655350.
    pub delay_ms: u32,
    /// `None` loops forever.
    pub loop_count: Option<u16>,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            delay_ms: DEFAULT_FRAME_DELAY_MS,
            loop_count: None,
        }
    }
}

/// A single frame pulled out of an animated GIF, re-encoded as PNG.
#[derive(Clone, Debug)]
pub struct ExtractedFrame {
    pub index: usize,
    pub delay_ms: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Build an animated GIF, one frame per image in input order.
pub fn make_gif(images: &[DynamicImage], options: &GifOptions) -> AnimationResult<Vec<u8>> {
    let Some(first) = images.first() else {
        return Err(ToolboxError::no_input_images("gif"));
    };
    let canvas_w = options.width.unwrap_or_else(|| first.width());
    let canvas_h = options.height.unwrap_or_else(|| first.height());
    if canvas_w == 0 || canvas_h == 0 {
        return Err(ToolboxError::invalid_argument(
            "size",
            format!("{canvas_w}x{canvas_h}"),
            "GIF canvas must be at least 1x1",
        ));
    }
    // GIF stores the logical screen size as u16.
    if canvas_w > u16::MAX as u32 || canvas_h > u16::MAX as u32 {
        return Err(ToolboxError::dimension_exceeds_limit(
            canvas_w.max(canvas_h),
            u16::MAX as u32,
        ));
    }
    check_dimensions(canvas_w, canvas_h)?;

    let frames = images
        .iter()
        .map(|img| {
            Ok(AnimationFrame {
                image: fit_onto_canvas(img, canvas_w, canvas_h)?,
                delay_ms: options.delay_ms,
            })
        })
        .collect::<AnimationResult<Vec<_>>>()?;

    let gif = encode_animation(&frames, options.loop_count)?;
    tracing::debug!(
        target: "imgtoolbox::animation",
        frames = frames.len(),
        width = canvas_w,
        height = canvas_h,
        bytes = gif.len(),
        "encoded gif"
    );
    Ok(gif)
}

// Fit inside the canvas keeping aspect ratio, centered on transparent pixels.
fn fit_onto_canvas(img: &DynamicImage, canvas_w: u32, canvas_h: u32) -> AnimationResult<RgbaImage> {
    let (w, h) = img.dimensions();
    let (fit_w, fit_h) = calc_fit_within(w, h, canvas_w, canvas_h);
    let frame = if (fit_w, fit_h) == (w, h) {
        img.to_rgba8()
    } else {
        fast_resize(img, fit_w, fit_h)?.to_rgba8()
    };
    if (fit_w, fit_h) == (canvas_w, canvas_h) {
        return Ok(frame);
    }

    let mut canvas = RgbaImage::new(canvas_w, canvas_h);
    let left = (canvas_w - fit_w) / 2;
    let top = (canvas_h - fit_h) / 2;
    imageops::replace(&mut canvas, &frame, left as i64, top as i64);
    Ok(canvas)
}

/// Decode every frame of an animated GIF and re-encode each one as PNG.
pub fn extract_frames(bytes: &[u8]) -> AnimationResult<Vec<ExtractedFrame>> {
    match detect_format(bytes) {
        Some(ImageFormat::Gif) => {}
        Some(other) => {
            return Err(ToolboxError::unsupported_format(format!(
                "{other:?} (frame extraction needs GIF input)"
            )))
        }
        None => return Err(ToolboxError::unsupported_format("unknown")),
    }

    let frames = decode_animation(bytes)?;
    let mut out = Vec::with_capacity(frames.len());
    for (index, frame) in frames.into_iter().enumerate() {
        let (width, height) = frame.image.dimensions();
        let png = encode_png(&DynamicImage::ImageRgba8(frame.image), false)?;
        out.push(ExtractedFrame {
            index,
            delay_ms: frame.delay_ms,
            width,
            height,
            png,
        });
    }
    tracing::debug!(target: "imgtoolbox::animation", frames = out.len(), "extracted gif frames");
    Ok(out)
}
