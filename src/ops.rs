// src/ops.rs
//
// Pipeline operations, output formats and named presets.
// These are cheap to create and store - the expensive work happens when a
// terminal method (to_buffer, to_ico, ...) runs the pipeline.

use crate::engine::Color;
use crate::error::ToolboxError;
use bitflags::bitflags;
use std::sync::Arc;

/// How `Resize` maps the source onto the requested box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResizeFit {
    /// Keep aspect ratio; the result fits inside the box. One side may be omitted.
    #[default]
    Inside,
    /// Stretch each axis independently to the exact box.
    Fill,
}

/// Image operations that can be queued for lazy execution.
///
/// Each operation is self-contained: no references, no lifetimes.
/// Overlay images are shared through `Arc` so cloning a queue stays cheap.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Resize with optional width/height (maintains aspect ratio if one is None)
    Resize {
        width: Option<u32>,
        height: Option<u32>,
        fit: ResizeFit,
    },

    /// Crop a region from the image
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Rotate by a multiple of 90 degrees (negatives allowed)
    Rotate { degrees: i32 },

    /// Flip horizontally
    FlipH,

    /// Flip vertically
    FlipV,

    /// Adjust brightness (-100 to 100)
    Brightness { value: i32 },

    /// Adjust contrast (-100 to 100)
    Contrast { value: i32 },

    /// Grayscale conversion
    Grayscale,

    /// Apply EXIF orientation (1-8)
    AutoOrient { orientation: u16 },

    /// Draw a bitmap-font text overlay
    TextWatermark(TextWatermark),

    /// Blend another image on top
    ImageWatermark(ImageWatermark),
}

impl Operation {
    /// Short stable name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Resize { .. } => "resize",
            Operation::Crop { .. } => "crop",
            Operation::Rotate { .. } => "rotate",
            Operation::FlipH => "flip_h",
            Operation::FlipV => "flip_v",
            Operation::Brightness { .. } => "brightness",
            Operation::Contrast { .. } => "contrast",
            Operation::Grayscale => "grayscale",
            Operation::AutoOrient { .. } => "auto_orient",
            Operation::TextWatermark(_) => "text_watermark",
            Operation::ImageWatermark(_) => "image_watermark",
        }
    }
}

/// Corner a watermark is pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

/// Where a watermark is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// A single copy pinned to `anchor`, inset by `margin` pixels.
    Anchored { anchor: Anchor, margin: u32 },
    /// Repeat across the whole image with `spacing` pixels between copies.
    Tile { spacing: u32 },
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Anchored {
            anchor: Anchor::BottomRight,
            margin: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextWatermark {
    pub text: String,
    pub color: Color,
    /// Integer magnification of the 8x8 glyphs.
    pub scale: u32,
    /// 0.0 exclusive .. 1.0 inclusive
    pub opacity: f32,
    pub placement: Placement,
}

impl TextWatermark {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: Color::WHITE,
            scale: 2,
            opacity: 0.5,
            placement: Placement::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageWatermark {
    /// Encoded overlay (any decodable format); decoded when the pipeline runs.
    pub data: Arc<[u8]>,
    /// Overlay width as a fraction of the base width, (0, 1].
    pub scale: f32,
    pub opacity: f32,
    pub placement: Placement,
}

impl ImageWatermark {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            scale: 0.25,
            opacity: 0.8,
            placement: Placement::default(),
        }
    }
}

bitflags! {
    /// What an output format can carry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FormatCaps: u8 {
        const ALPHA = 0b0001;
        const LOSSY = 0b0010;
        const ANIMATION = 0b0100;
    }
}

/// Output format for encoding
#[derive(Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// Alpha is flattened onto `background`.
    Jpeg { quality: u8, background: Color },
    Png { optimize: bool },
    /// quality 100 selects lossless
    WebP { quality: u8 },
    Gif,
    Bmp,
}

pub const DEFAULT_QUALITY: u8 = 80;

impl OutputFormat {
    pub fn from_str(format: &str, quality: Option<u8>) -> Result<Self, ToolboxError> {
        let q = quality.unwrap_or(DEFAULT_QUALITY).clamp(1, 100);
        match format.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg {
                quality: q,
                background: Color::WHITE,
            }),
            "png" => Ok(Self::Png { optimize: false }),
            "webp" => Ok(Self::WebP { quality: q }),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            other => Err(ToolboxError::unsupported_format(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
            Self::Png { .. } => "png",
            Self::WebP { .. } => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png { .. } => "image/png",
            Self::WebP { .. } => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpg",
            Self::Png { .. } => "png",
            Self::WebP { .. } => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }

    pub fn caps(&self) -> FormatCaps {
        match self {
            Self::Jpeg { .. } => FormatCaps::LOSSY,
            Self::Png { .. } => FormatCaps::ALPHA,
            Self::WebP { quality } if *quality >= 100 => FormatCaps::ALPHA,
            Self::WebP { .. } => FormatCaps::ALPHA | FormatCaps::LOSSY,
            Self::Gif => FormatCaps::ALPHA | FormatCaps::ANIMATION,
            Self::Bmp => FormatCaps::empty(),
        }
    }
}

// =============================================================================
// ICON PRESETS
// =============================================================================

/// Named lists of icon edge lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IconPreset {
    /// Browser favicon: 16, 32, 48
    Favicon,
    /// Full Windows shell set: 16 through 256
    Windows,
    /// High-DPI only: 64, 128, 256
    Large,
}

impl IconPreset {
    pub const ALL: [IconPreset; 3] = [IconPreset::Favicon, IconPreset::Windows, IconPreset::Large];

    pub fn from_name(name: &str) -> Result<Self, ToolboxError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "favicon" => Ok(Self::Favicon),
            "windows" => Ok(Self::Windows),
            "large" => Ok(Self::Large),
            _ => Err(ToolboxError::invalid_preset(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Favicon => "favicon",
            Self::Windows => "windows",
            Self::Large => "large",
        }
    }

    pub fn sizes(&self) -> &'static [u32] {
        match self {
            Self::Favicon => &[16, 32, 48],
            Self::Windows => &[16, 24, 32, 48, 64, 128, 256],
            Self::Large => &[64, 128, 256],
        }
    }
}

/// Options for ICO generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IconOptions {
    /// Run oxipng over every PNG payload.
    pub optimize: bool,
}
