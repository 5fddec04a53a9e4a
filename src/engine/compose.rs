// src/engine/compose.rs
//
// Watermark rendering and collage/stitch layouts.
//
// Everything here blends straight-alpha RGBA with the "over" operator and
// runs on the calling thread. Inputs for collages are decoded beforehand
// (in parallel, see pool.rs); composition order is always input order.

use crate::engine::color::Color;
use crate::engine::decoder::decode_image;
use crate::engine::pipeline::{calc_fit_within, calc_resize_dimensions, fast_resize_owned};
use crate::engine::check_dimensions;
use crate::error::ToolboxError;
use crate::ops::{Anchor, ImageWatermark, Placement, TextWatermark};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{imageops, DynamicImage, Rgba, RgbaImage};

type ComposeResult<T> = std::result::Result<T, ToolboxError>;

const GLYPH_EDGE: u32 = 8;
const MAX_TEXT_SCALE: u32 = 64;

// =============================================================================
// WATERMARK
// =============================================================================

fn validate_opacity(opacity: f32) -> ComposeResult<()> {
    if !(opacity > 0.0 && opacity <= 1.0) {
        return Err(ToolboxError::invalid_argument(
            "opacity",
            opacity.to_string(),
            "must be in (0, 1]",
        ));
    }
    Ok(())
}

/// Render `text` with the 8x8 bitmap font into a tight RGBA tile.
/// Unknown characters render as '?'. Glyphs are separated by `scale` pixels.
pub fn render_text(text: &str, scale: u32, color: Color) -> ComposeResult<RgbaImage> {
    if text.is_empty() {
        return Err(ToolboxError::invalid_argument(
            "text",
            "",
            "watermark text must not be empty",
        ));
    }
    if scale == 0 || scale > MAX_TEXT_SCALE {
        return Err(ToolboxError::invalid_argument(
            "scale",
            scale.to_string(),
            format!("must be between 1 and {MAX_TEXT_SCALE}"),
        ));
    }

    let glyph_edge = GLYPH_EDGE * scale;
    let count = text.chars().count() as u64;
    let width = count * glyph_edge as u64 + (count - 1) * scale as u64;
    let width = u32::try_from(width)
        .map_err(|_| ToolboxError::dimension_exceeds_limit(u32::MAX, crate::engine::MAX_DIMENSION))?;
    check_dimensions(width, glyph_edge)?;

    let mut tile = RgbaImage::new(width, glyph_edge);
    let ink = color.to_rgba();
    for (index, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let origin_x = index as u32 * (glyph_edge + scale);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_EDGE {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let x0 = origin_x + col * scale;
                let y0 = row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        tile.put_pixel(x0 + dx, y0 + dy, ink);
                    }
                }
            }
        }
    }
    Ok(tile)
}

/// Top-left corners for every copy of a `w`x`h` overlay on a `base_w`x`base_h` image,
/// row by row. Tiling yields origins lazily.
pub fn placement_origins(
    base_w: u32,
    base_h: u32,
    w: u32,
    h: u32,
    placement: Placement,
) -> impl Iterator<Item = (i64, i64)> {
    let (bw, bh, w, h) = (base_w as i64, base_h as i64, w as i64, h as i64);
    // (first origin, step, columns, rows)
    let ((x0, y0), (step_x, step_y), cols, rows) = match placement {
        Placement::Anchored { anchor, margin } => {
            let m = margin as i64;
            let origin = match anchor {
                Anchor::TopLeft => (m, m),
                Anchor::TopRight => (bw - w - m, m),
                Anchor::BottomLeft => (m, bh - h - m),
                Anchor::BottomRight => (bw - w - m, bh - h - m),
                Anchor::Center => ((bw - w) / 2, (bh - h) / 2),
            };
            (origin, (0, 0), 1, 1)
        }
        Placement::Tile { spacing } => {
            let step_x = (w + spacing as i64).max(1);
            let step_y = (h + spacing as i64).max(1);
            let cols = (bw + step_x - 1) / step_x;
            let rows = (bh + step_y - 1) / step_y;
            ((0, 0), (step_x, step_y), cols, rows)
        }
    };
    (0..rows).flat_map(move |row| {
        (0..cols).map(move |col| (x0 + col * step_x, y0 + row * step_y))
    })
}

/// Alpha-blend `overlay` onto `canvas` at (`left`, `top`), scaling overlay alpha by `opacity`.
/// Parts falling outside the canvas are clipped.
pub fn blend_over(canvas: &mut RgbaImage, overlay: &RgbaImage, left: i64, top: i64, opacity: f32) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    for (ox, oy, src) in overlay.enumerate_pixels() {
        let x = left + ox as i64;
        let y = top + oy as i64;
        if x < 0 || y < 0 || x >= cw || y >= ch || src[3] == 0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(x as u32, y as u32);
        *dst = over(*src, *dst, opacity);
    }
}

fn over(src: Rgba<u8>, dst: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0 * opacity;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

fn stamp(img: DynamicImage, overlay: &RgbaImage, placement: Placement, opacity: f32) -> DynamicImage {
    let had_alpha = img.color().has_alpha();
    let mut canvas = img.into_rgba8();
    for (x, y) in placement_origins(
        canvas.width(),
        canvas.height(),
        overlay.width(),
        overlay.height(),
        placement,
    ) {
        blend_over(&mut canvas, overlay, x, y, opacity);
    }
    let out = DynamicImage::ImageRgba8(canvas);
    if had_alpha {
        out
    } else {
        DynamicImage::ImageRgb8(out.to_rgb8())
    }
}

pub fn draw_text_watermark(img: DynamicImage, mark: &TextWatermark) -> ComposeResult<DynamicImage> {
    validate_opacity(mark.opacity)?;
    let tile = render_text(&mark.text, mark.scale, mark.color)?;
    tracing::trace!(
        target: "imgtoolbox::compose",
        chars = mark.text.chars().count(),
        tile_w = tile.width(),
        tile_h = tile.height(),
        "text watermark"
    );
    Ok(stamp(img, &tile, mark.placement, mark.opacity))
}

pub fn draw_image_watermark(
    img: DynamicImage,
    mark: &ImageWatermark,
) -> ComposeResult<DynamicImage> {
    validate_opacity(mark.opacity)?;
    if !(mark.scale > 0.0 && mark.scale <= 1.0) {
        return Err(ToolboxError::invalid_argument(
            "scale",
            mark.scale.to_string(),
            "must be in (0, 1]",
        ));
    }
    let (overlay, _) = decode_image(&mark.data)?;

    let target_w = ((img.width() as f32 * mark.scale).round() as u32).max(1);
    let (w, h) = calc_resize_dimensions(overlay.width(), overlay.height(), Some(target_w), None);
    let h = h.max(1);
    let overlay = if (w, h) == (overlay.width(), overlay.height()) {
        overlay.into_rgba8()
    } else {
        fast_resize_owned(overlay, w, h)?.into_rgba8()
    };
    Ok(stamp(img, &overlay, mark.placement, mark.opacity))
}

// =============================================================================
// COLLAGE
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollageLayout {
    Horizontal,
    Vertical,
    Grid { columns: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollageOptions {
    pub layout: CollageLayout,
    /// Pixels between neighbouring images.
    pub gap: u32,
    pub background: Color,
    /// Scale strips to the smallest cross-axis edge (never upscales).
    pub uniform: bool,
}

impl Default for CollageOptions {
    fn default() -> Self {
        Self {
            layout: CollageLayout::Horizontal,
            gap: 0,
            background: Color::WHITE,
            uniform: false,
        }
    }
}

fn canvas_edge(total: u64) -> ComposeResult<u32> {
    u32::try_from(total)
        .map_err(|_| ToolboxError::dimension_exceeds_limit(u32::MAX, crate::engine::MAX_DIMENSION))
}

fn to_rgba_scaled(img: &DynamicImage, w: u32, h: u32) -> ComposeResult<RgbaImage> {
    if (w, h) == (img.width(), img.height()) {
        return Ok(img.to_rgba8());
    }
    Ok(fast_resize_owned(img.clone(), w, h)?.into_rgba8())
}

/// Stitch already-decoded images according to `options.layout`.
pub fn compose_collage(images: &[DynamicImage], options: &CollageOptions) -> ComposeResult<RgbaImage> {
    if images.is_empty() {
        return Err(ToolboxError::no_input_images("collage"));
    }
    let n = images.len() as u64;
    let gap = options.gap as u64;

    // (tile, x, y) in canvas coordinates
    let (width, height, tiles): (u64, u64, Vec<(RgbaImage, u64, u64)>) = match options.layout {
        CollageLayout::Horizontal => {
            let target_h = images.iter().map(|i| i.height()).min().unwrap_or(0);
            let scaled = images
                .iter()
                .map(|img| {
                    let (w, h) = if options.uniform {
                        calc_fit_within(img.width(), img.height(), u32::MAX, target_h)
                    } else {
                        (img.width(), img.height())
                    };
                    to_rgba_scaled(img, w, h)
                })
                .collect::<ComposeResult<Vec<_>>>()?;
            let height = scaled.iter().map(|t| t.height() as u64).max().unwrap_or(0);
            let mut x = 0u64;
            let mut tiles = Vec::with_capacity(scaled.len());
            for tile in scaled {
                let y = (height - tile.height() as u64) / 2;
                let w = tile.width() as u64;
                tiles.push((tile, x, y));
                x += w + gap;
            }
            (x - gap, height, tiles)
        }
        CollageLayout::Vertical => {
            let target_w = images.iter().map(|i| i.width()).min().unwrap_or(0);
            let scaled = images
                .iter()
                .map(|img| {
                    let (w, h) = if options.uniform {
                        calc_fit_within(img.width(), img.height(), target_w, u32::MAX)
                    } else {
                        (img.width(), img.height())
                    };
                    to_rgba_scaled(img, w, h)
                })
                .collect::<ComposeResult<Vec<_>>>()?;
            let width = scaled.iter().map(|t| t.width() as u64).max().unwrap_or(0);
            let mut y = 0u64;
            let mut tiles = Vec::with_capacity(scaled.len());
            for tile in scaled {
                let x = (width - tile.width() as u64) / 2;
                let h = tile.height() as u64;
                tiles.push((tile, x, y));
                y += h + gap;
            }
            (width, y - gap, tiles)
        }
        CollageLayout::Grid { columns } => {
            if columns == 0 {
                return Err(ToolboxError::invalid_argument(
                    "columns",
                    "0",
                    "grid needs at least one column",
                ));
            }
            let cols = (columns as u64).min(n);
            let rows = n.div_ceil(cols);
            let cell_w = images.iter().map(|i| i.width()).max().unwrap_or(0);
            let cell_h = images.iter().map(|i| i.height()).max().unwrap_or(0);
            let mut tiles = Vec::with_capacity(images.len());
            for (index, img) in images.iter().enumerate() {
                let (w, h) = calc_fit_within(img.width(), img.height(), cell_w, cell_h);
                let tile = to_rgba_scaled(img, w, h)?;
                let col = index as u64 % cols;
                let row = index as u64 / cols;
                let x = col * (cell_w as u64 + gap) + (cell_w - w) as u64 / 2;
                let y = row * (cell_h as u64 + gap) + (cell_h - h) as u64 / 2;
                tiles.push((tile, x, y));
            }
            (
                cols * cell_w as u64 + (cols - 1) * gap,
                rows * cell_h as u64 + (rows - 1) * gap,
                tiles,
            )
        }
    };

    let (width, height) = (canvas_edge(width)?, canvas_edge(height)?);
    check_dimensions(width, height)?;
    tracing::debug!(
        target: "imgtoolbox::compose",
        layout = ?options.layout,
        inputs = images.len(),
        width,
        height,
        "collage"
    );

    let mut canvas = RgbaImage::from_pixel(width, height, options.background.to_rgba());
    for (tile, x, y) in &tiles {
        imageops::overlay(&mut canvas, tile, *x as i64, *y as i64);
    }
    Ok(canvas)
}
