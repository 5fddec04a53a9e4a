// src/engine/api.rs
//
// ImageTool builder (Rust) and the NAPI functions exposed to Node.js.

use crate::codecs::ico::IconFile;
use crate::engine::animation::{self, ExtractedFrame, GifOptions};
use crate::engine::color::{average_color, pick_color, Color};
use crate::engine::compose::CollageOptions;
use crate::engine::io::Source;
use crate::engine::limits::InputLimits;
use crate::engine::tasks::{
    AnimationTask, CollageTask, EncodeTask, IconTask, ProcessJob, WriteFileTask,
};
use crate::error::ToolboxError;
use crate::ops::{
    IconOptions, IconPreset, ImageWatermark, Operation, OutputFormat, ResizeFit, TextWatermark,
};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "napi")]
use crate::engine::compose::CollageLayout;
#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;

type ApiResult<T> = std::result::Result<T, ToolboxError>;

/// A lazy single-image pipeline.
///
/// Operations are only queued; nothing is decoded until a terminal method runs.
/// Terminals take `&self`, so one tool can produce several outputs.
///
/// ```no_run
/// use imgtoolbox::engine::ImageTool;
/// use imgtoolbox::ops::{IconOptions, OutputFormat};
///
/// # fn main() -> imgtoolbox::error::Result<()> {
/// let tool = ImageTool::from_path("logo.png")?.resize(Some(512), None);
/// let ico = tool.to_ico(&[16, 32, 48], IconOptions::default())?;
/// tool.to_file("logo.webp", &OutputFormat::WebP { quality: 80 })?;
/// # let _ = ico;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ImageTool {
    source: Source,
    ops: Vec<Operation>,
    auto_orient: bool,
    limits: InputLimits,
}

impl ImageTool {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::from_source(Source::from_bytes(data))
    }

    /// Memory-map `path`. Fails immediately if the file cannot be opened.
    pub fn from_path(path: impl AsRef<Path>) -> ApiResult<Self> {
        Ok(Self::from_source(Source::map_file(path)?))
    }

    /// Remember `path` and read it only when a terminal method runs.
    pub fn from_path_lazy(path: impl Into<PathBuf>) -> Self {
        Self::from_source(Source::lazy_path(path))
    }

    pub fn from_source(source: Source) -> Self {
        Self {
            source,
            ops: Vec::new(),
            auto_orient: true,
            limits: InputLimits::default(),
        }
    }

    // =========================================================================
    // PIPELINE OPERATIONS
    // =========================================================================

    /// Fit inside the box keeping aspect ratio. Either side may be None.
    pub fn resize(self, width: Option<u32>, height: Option<u32>) -> Self {
        self.push(Operation::Resize {
            width,
            height,
            fit: ResizeFit::Inside,
        })
    }

    /// Stretch to exactly `width`x`height`.
    pub fn resize_exact(self, width: u32, height: u32) -> Self {
        self.push(Operation::Resize {
            width: Some(width),
            height: Some(height),
            fit: ResizeFit::Fill,
        })
    }

    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.push(Operation::Crop {
            x,
            y,
            width,
            height,
        })
    }

    /// Any multiple of 90, negative values included.
    pub fn rotate(self, degrees: i32) -> Self {
        self.push(Operation::Rotate { degrees })
    }

    pub fn flip_h(self) -> Self {
        self.push(Operation::FlipH)
    }

    pub fn flip_v(self) -> Self {
        self.push(Operation::FlipV)
    }

    /// -100..=100, clamped.
    pub fn brightness(self, value: i32) -> Self {
        self.push(Operation::Brightness {
            value: value.clamp(-100, 100),
        })
    }

    /// -100..=100, clamped.
    pub fn contrast(self, value: i32) -> Self {
        self.push(Operation::Contrast {
            value: value.clamp(-100, 100),
        })
    }

    pub fn grayscale(self) -> Self {
        self.push(Operation::Grayscale)
    }

    pub fn watermark_text(self, mark: TextWatermark) -> Self {
        self.push(Operation::TextWatermark(mark))
    }

    pub fn watermark_image(self, mark: ImageWatermark) -> Self {
        self.push(Operation::ImageWatermark(mark))
    }

    /// Apply the EXIF orientation before anything else (default: on).
    pub fn auto_orient(mut self, enabled: bool) -> Self {
        self.auto_orient = enabled;
        self
    }

    pub fn limits(mut self, limits: InputLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    fn push(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    fn job(&self) -> ProcessJob {
        ProcessJob {
            source: self.source.clone(),
            ops: self.ops.clone(),
            auto_orient: self.auto_orient,
            limits: self.limits.clone(),
        }
    }

    // =========================================================================
    // TERMINALS
    // =========================================================================

    /// Source dimensions read from the header only. Queued ops are not applied.
    pub fn dimensions(&self) -> ApiResult<(u32, u32)> {
        let meta = match &self.source {
            Source::Path(path) => crate::inspect_header_from_path(path)?,
            other => {
                let bytes = other.bytes()?;
                crate::inspect_header_from_bytes(&bytes)?
            }
        };
        Ok((meta.width, meta.height))
    }

    /// Decode and run every queued operation.
    pub fn decode(&self) -> ApiResult<DynamicImage> {
        self.job().process(Instant::now())
    }

    pub fn to_buffer(&self, format: &OutputFormat) -> ApiResult<Vec<u8>> {
        EncodeTask {
            job: self.job(),
            format: format.clone(),
        }
        .run()
    }

    /// Encode and atomically write to `path`. Returns the number of bytes written.
    pub fn to_file(&self, path: impl AsRef<Path>, format: &OutputFormat) -> ApiResult<u64> {
        WriteFileTask {
            job: self.job(),
            format: format.clone(),
            output_path: path.as_ref().to_path_buf(),
        }
        .run()
    }

    pub fn to_ico(&self, sizes: &[u32], options: IconOptions) -> ApiResult<IconFile> {
        IconTask {
            job: self.job(),
            sizes: sizes.to_vec(),
            options,
        }
        .run()
    }

    /// `favicon`, `windows` or `large` (case-insensitive).
    pub fn to_ico_preset(&self, name: &str) -> ApiResult<IconFile> {
        let preset = IconPreset::from_name(name)?;
        self.to_ico(preset.sizes(), IconOptions::default())
    }

    /// Color of one pixel of the processed image.
    pub fn pick_color(&self, x: u32, y: u32) -> ApiResult<Color> {
        pick_color(&self.decode()?, x, y)
    }

    /// Mean color of a rectangle of the processed image, clipped to its bounds.
    pub fn average_color(&self, x: u32, y: u32, width: u32, height: u32) -> ApiResult<Color> {
        average_color(&self.decode()?, x, y, width, height)
    }
}

// =============================================================================
// MULTI-INPUT OPERATIONS
// =============================================================================

/// Stitch `sources` into one image and encode it. Inputs decode in parallel.
pub fn collage(
    sources: &[Source],
    options: &CollageOptions,
    format: &OutputFormat,
) -> ApiResult<Vec<u8>> {
    CollageTask {
        sources: sources.to_vec(),
        options: *options,
        format: format.clone(),
        auto_orient: true,
        limits: InputLimits::default(),
    }
    .run()
}

/// Build an animated GIF, one frame per source. Inputs decode in parallel.
pub fn make_gif(sources: &[Source], options: &GifOptions) -> ApiResult<Vec<u8>> {
    AnimationTask {
        sources: sources.to_vec(),
        options: options.clone(),
        auto_orient: true,
        limits: InputLimits::default(),
    }
    .run()
}

/// Every frame of an animated GIF as PNG.
pub fn extract_frames(bytes: &[u8]) -> ApiResult<Vec<ExtractedFrame>> {
    animation::extract_frames(bytes)
}

// =============================================================================
// NAPI
// =============================================================================

#[cfg(feature = "napi")]
fn buffers_to_sources(inputs: Vec<Buffer>) -> Vec<Source> {
    inputs
        .into_iter()
        .map(|b| Source::from_bytes(b.to_vec()))
        .collect()
}

#[cfg(feature = "napi")]
fn limits_from_name(name: Option<String>) -> Result<InputLimits> {
    match name {
        Some(name) => Ok(InputLimits::from_name(&name)?),
        None => Ok(InputLimits::default()),
    }
}

/// Options for `convert()`.
#[cfg(feature = "napi")]
#[napi(object)]
pub struct ConvertOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Stretch to exactly width x height instead of fitting inside
    pub exact: Option<bool>,
    pub rotate: Option<i32>,
    pub flip_h: Option<bool>,
    pub flip_v: Option<bool>,
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub grayscale: Option<bool>,
    /// Text watermark, rendered with the built-in 8x8 font
    pub watermark_text: Option<String>,
    /// `strict`, `lenient` or `disabled`
    pub limits: Option<String>,
}

/// Convert and transform one image.
/// format: "jpeg", "jpg", "png", "webp", "gif", "bmp"
#[cfg(feature = "napi")]
#[napi(ts_return_type = "Promise<Buffer>")]
pub fn convert(
    input: Buffer,
    format: String,
    quality: Option<u8>,
    options: Option<ConvertOptions>,
) -> Result<AsyncTask<EncodeTask>> {
    let output_format = OutputFormat::from_str(&format, quality)?;
    let mut tool = ImageTool::from_bytes(input.to_vec());

    if let Some(opts) = options {
        if opts.width.is_some() || opts.height.is_some() {
            tool = match (opts.exact.unwrap_or(false), opts.width, opts.height) {
                (true, Some(w), Some(h)) => tool.resize_exact(w, h),
                _ => tool.resize(opts.width, opts.height),
            };
        }
        if let Some(degrees) = opts.rotate {
            tool = tool.rotate(degrees);
        }
        if opts.flip_h.unwrap_or(false) {
            tool = tool.flip_h();
        }
        if opts.flip_v.unwrap_or(false) {
            tool = tool.flip_v();
        }
        if let Some(value) = opts.brightness {
            tool = tool.brightness(value);
        }
        if let Some(value) = opts.contrast {
            tool = tool.contrast(value);
        }
        if opts.grayscale.unwrap_or(false) {
            tool = tool.grayscale();
        }
        if let Some(text) = opts.watermark_text {
            tool = tool.watermark_text(TextWatermark::new(text));
        }
        tool = tool.limits(limits_from_name(opts.limits)?);
    }

    Ok(AsyncTask::new(EncodeTask {
        job: tool.job(),
        format: output_format,
    }))
}

/// Build a multi-resolution .ico from one image. Sizes are rendered in order.
#[cfg(feature = "napi")]
#[napi(js_name = "buildIco", ts_return_type = "Promise<Buffer>")]
pub fn build_ico(
    input: Buffer,
    sizes: Vec<u32>,
    optimize: Option<bool>,
) -> Result<AsyncTask<IconTask>> {
    // Fail fast on the JS thread rather than after scheduling
    crate::engine::icon::validate_sizes(&sizes)?;
    Ok(AsyncTask::new(IconTask {
        job: ImageTool::from_bytes(input.to_vec()).job(),
        sizes,
        options: IconOptions {
            optimize: optimize.unwrap_or(false),
        },
    }))
}

/// Build an .ico from a named preset: "favicon", "windows" or "large".
#[cfg(feature = "napi")]
#[napi(js_name = "buildIcoPreset", ts_return_type = "Promise<Buffer>")]
pub fn build_ico_preset(input: Buffer, preset: String) -> Result<AsyncTask<IconTask>> {
    let preset = IconPreset::from_name(&preset)?;
    Ok(AsyncTask::new(IconTask {
        job: ImageTool::from_bytes(input.to_vec()).job(),
        sizes: preset.sizes().to_vec(),
        options: IconOptions::default(),
    }))
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct CollageInput {
    /// "horizontal" (default), "vertical" or "grid"
    pub layout: Option<String>,
    /// Grid columns (default 2)
    pub columns: Option<u32>,
    pub gap: Option<u32>,
    /// Hex color, e.g. "#ffffff"
    pub background: Option<String>,
    pub uniform: Option<bool>,
}

#[cfg(feature = "napi")]
impl CollageInput {
    fn into_options(self) -> Result<CollageOptions> {
        let defaults = CollageOptions::default();
        let layout = match self.layout.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("horizontal") => CollageLayout::Horizontal,
            Some("vertical") => CollageLayout::Vertical,
            Some("grid") => CollageLayout::Grid {
                columns: self.columns.unwrap_or(2),
            },
            Some(other) => {
                return Err(ToolboxError::invalid_argument(
                    "layout",
                    other.to_string(),
                    "expected horizontal, vertical or grid",
                )
                .into())
            }
        };
        let background = match self.background {
            Some(hex) => Color::parse_hex(&hex)?,
            None => defaults.background,
        };
        Ok(CollageOptions {
            layout,
            gap: self.gap.unwrap_or(defaults.gap),
            background,
            uniform: self.uniform.unwrap_or(defaults.uniform),
        })
    }
}

/// Stitch several images into one.
#[cfg(feature = "napi")]
#[napi(js_name = "collage", ts_return_type = "Promise<Buffer>")]
pub fn collage_js(
    inputs: Vec<Buffer>,
    format: String,
    quality: Option<u8>,
    options: Option<CollageInput>,
) -> Result<AsyncTask<CollageTask>> {
    let output_format = OutputFormat::from_str(&format, quality)?;
    let options = match options {
        Some(input) => input.into_options()?,
        None => CollageOptions::default(),
    };
    Ok(AsyncTask::new(CollageTask {
        sources: buffers_to_sources(inputs),
        options,
        format: output_format,
        auto_orient: true,
        limits: InputLimits::default(),
    }))
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct GifInput {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Milliseconds per frame (default 500)
    pub delay_ms: Option<u32>,
    /// Omit to loop forever
    pub loop_count: Option<u16>,
}

/// Build an animated GIF from still images.
#[cfg(feature = "napi")]
#[napi(js_name = "makeGif", ts_return_type = "Promise<Buffer>")]
pub fn make_gif_js(inputs: Vec<Buffer>, options: Option<GifInput>) -> Result<AsyncTask<AnimationTask>> {
    let defaults = GifOptions::default();
    let options = match options {
        Some(input) => GifOptions {
            width: input.width,
            height: input.height,
            delay_ms: input.delay_ms.unwrap_or(defaults.delay_ms),
            loop_count: input.loop_count,
        },
        None => defaults,
    };
    Ok(AsyncTask::new(AnimationTask {
        sources: buffers_to_sources(inputs),
        options,
        auto_orient: true,
        limits: InputLimits::default(),
    }))
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct GifFrame {
    pub index: u32,
    pub delay_ms: u32,
    pub width: u32,
    pub height: u32,
    /// The frame as PNG
    pub data: Buffer,
}

/// Split an animated GIF into PNG frames.
#[cfg(feature = "napi")]
#[napi(js_name = "extractFrames")]
pub fn extract_frames_js(input: Buffer) -> Result<Vec<GifFrame>> {
    let frames = extract_frames(input.as_ref())?;
    Ok(frames
        .into_iter()
        .map(|f| GifFrame {
            index: f.index as u32,
            delay_ms: f.delay_ms,
            width: f.width,
            height: f.height,
            data: f.png.into(),
        })
        .collect())
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct PickedColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
    /// "#rrggbb" (or "#rrggbbaa" when not opaque)
    pub hex: String,
    /// "rgba(r, g, b, a)"
    pub css: String,
}

#[cfg(feature = "napi")]
impl From<Color> for PickedColor {
    fn from(c: Color) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
            hex: c.to_hex(),
            css: c.to_css_rgba(),
        }
    }
}

/// Color of the pixel at (x, y).
#[cfg(feature = "napi")]
#[napi(js_name = "pickColor")]
pub fn pick_color_js(input: Buffer, x: u32, y: u32) -> Result<PickedColor> {
    let color = ImageTool::from_bytes(input.to_vec()).pick_color(x, y)?;
    Ok(color.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::ico::read_directory;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn ops_are_queued_not_run() {
        let tool = ImageTool::from_bytes(b"not an image".to_vec())
            .resize(Some(10), None)
            .rotate(90)
            .grayscale();
        assert_eq!(tool.ops().len(), 3);
        assert!(tool.decode().is_err());
    }

    #[test]
    fn brightness_and_contrast_are_clamped() {
        let tool = ImageTool::from_bytes(Vec::new())
            .brightness(500)
            .contrast(-500);
        assert!(matches!(tool.ops()[0], Operation::Brightness { value: 100 }));
        assert!(matches!(tool.ops()[1], Operation::Contrast { value: -100 }));
    }

    #[test]
    fn dimensions_read_header_only() {
        let tool = ImageTool::from_bytes(png_bytes(12, 7)).resize(Some(6), None);
        assert_eq!(tool.dimensions().unwrap(), (12, 7));
        assert_eq!(tool.decode().unwrap().dimensions(), (6, 4));
    }

    #[test]
    fn terminals_can_run_twice() {
        let tool = ImageTool::from_bytes(png_bytes(10, 10)).rotate(-90);
        let png = tool.to_buffer(&OutputFormat::Png { optimize: false }).unwrap();
        let jpeg = tool
            .to_buffer(&OutputFormat::from_str("jpg", Some(70)).unwrap())
            .unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn to_ico_preset_uses_preset_sizes() {
        let tool = ImageTool::from_bytes(png_bytes(64, 64));
        let icon = tool.to_ico_preset("Favicon").unwrap();
        let sizes: Vec<u32> = read_directory(icon.as_ref())
            .unwrap()
            .iter()
            .map(|e| e.pixel_width())
            .collect();
        assert_eq!(sizes, vec![16, 32, 48]);
        assert!(matches!(
            tool.to_ico_preset("tiny"),
            Err(ToolboxError::InvalidPreset { .. })
        ));
    }

    #[test]
    fn pick_color_sees_processed_image() {
        let tool = ImageTool::from_bytes(png_bytes(10, 4));
        assert_eq!(tool.pick_color(0, 0).unwrap(), Color::rgb(255, 0, 0));
        let flipped = tool.clone().flip_h();
        assert_eq!(flipped.pick_color(0, 0).unwrap(), Color::rgb(0, 0, 255));
        assert!(matches!(
            tool.pick_color(10, 0),
            Err(ToolboxError::PixelOutOfBounds { .. })
        ));
    }

    #[test]
    fn lazy_path_reads_on_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.png");
        let tool = ImageTool::from_path_lazy(&path);
        std::fs::write(&path, png_bytes(5, 5)).unwrap();
        assert_eq!(tool.dimensions().unwrap(), (5, 5));
        assert!(ImageTool::from_path(dir.path().join("missing.png")).is_err());
    }

    #[test]
    fn free_functions_run_multi_input_ops() {
        let sources = vec![
            Source::from_bytes(png_bytes(4, 4)),
            Source::from_bytes(png_bytes(4, 4)),
        ];
        let stitched = collage(
            &sources,
            &CollageOptions::default(),
            &OutputFormat::Png { optimize: false },
        )
        .unwrap();
        assert_eq!(image::load_from_memory(&stitched).unwrap().dimensions(), (8, 4));

        let gif = make_gif(&sources, &GifOptions::default()).unwrap();
        assert_eq!(extract_frames(&gif).unwrap().len(), 2);
    }
}
