// src/error.rs
//
// Unified error handling for imgtoolbox
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Memory/time/dimension limits
// - InternalBug: Library bugs (should not happen)

#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;
use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used to decide how a failure is surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/time/dimension limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Stable code string exposed to bindings (e.g. `IMGTOOLBOX_USER_ERROR`).
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "IMGTOOLBOX_USER_ERROR",
            ErrorCategory::CodecError => "IMGTOOLBOX_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "IMGTOOLBOX_RESOURCE_LIMIT",
            ErrorCategory::InternalBug => "IMGTOOLBOX_INTERNAL_BUG",
        }
    }
}

/// imgtoolbox error types
///
/// Every failure aborts the whole operation: no partial output is returned.
#[derive(Debug, Error)]
pub enum ToolboxError {
    // File I/O Errors
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Corrupted image data")]
    CorruptedImage,

    #[error("Malformed ICO data: {message}")]
    MalformedIco { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Input limit exceeded: {reason}")]
    LimitViolation { reason: Cow<'static, str> },

    // Operation Errors
    #[error("Crop bounds ({x}+{width}, {y}+{height}) exceed image dimensions ({img_width}x{img_height})")]
    InvalidCropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("Invalid crop dimensions: width={width}, height={height}")]
    InvalidCropDimensions { width: u32, height: u32 },

    #[error(
        "Unsupported rotation angle: {degrees}. Only 0, 90, 180, 270 (and negatives) are supported"
    )]
    InvalidRotationAngle { degrees: i32 },

    #[error("Invalid resize dimensions: width={width:?}, height={height:?}")]
    InvalidResizeDimensions {
        width: Option<u32>,
        height: Option<u32>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Pixel ({x}, {y}) is outside the {width}x{height} image")]
    PixelOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    // Icon Errors
    #[error("No icon sizes requested")]
    NoIconSizes,

    #[error("Invalid icon size {size}: edge length must be between 1 and {max}")]
    InvalidIconSize { size: u32, max: u32 },

    #[error("No input images supplied for {operation}")]
    NoInputImages { operation: Cow<'static, str> },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Configuration Errors
    #[error("Unknown preset: '{name}'. Available: favicon, windows, large")]
    InvalidPreset { name: Cow<'static, str> },

    #[error("Unknown limit policy: '{policy}'. Expected strict, lenient or disabled")]
    InvalidLimitPolicy { policy: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn clone_io_error(source: &std::io::Error) -> std::io::Error {
    std::io::Error::new(source.kind(), source.to_string())
}

impl Clone for ToolboxError {
    fn clone(&self) -> Self {
        match self {
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: clone_io_error(source),
            },
            Self::MmapFailed { path, source } => Self::MmapFailed {
                path: path.clone(),
                source: clone_io_error(source),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: clone_io_error(source),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::CorruptedImage => Self::CorruptedImage,
            Self::MalformedIco { message } => Self::MalformedIco {
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::LimitViolation { reason } => Self::LimitViolation {
                reason: reason.clone(),
            },
            Self::InvalidCropBounds {
                x,
                y,
                width,
                height,
                img_width,
                img_height,
            } => Self::InvalidCropBounds {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
                img_width: *img_width,
                img_height: *img_height,
            },
            Self::InvalidCropDimensions { width, height } => Self::InvalidCropDimensions {
                width: *width,
                height: *height,
            },
            Self::InvalidRotationAngle { degrees } => {
                Self::InvalidRotationAngle { degrees: *degrees }
            }
            Self::InvalidResizeDimensions { width, height } => Self::InvalidResizeDimensions {
                width: *width,
                height: *height,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::PixelOutOfBounds {
                x,
                y,
                width,
                height,
            } => Self::PixelOutOfBounds {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            },
            Self::NoIconSizes => Self::NoIconSizes,
            Self::InvalidIconSize { size, max } => Self::InvalidIconSize {
                size: *size,
                max: *max,
            },
            Self::NoInputImages { operation } => Self::NoInputImages {
                operation: operation.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::InvalidPreset { name } => Self::InvalidPreset { name: name.clone() },
            Self::InvalidLimitPolicy { policy } => Self::InvalidLimitPolicy {
                policy: policy.clone(),
            },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ToolboxError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn corrupted_image() -> Self {
        Self::CorruptedImage
    }

    pub fn malformed_ico(message: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedIco {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn limit_violation(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::LimitViolation {
            reason: reason.into(),
        }
    }

    pub fn invalid_crop_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::InvalidCropBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn invalid_crop_dimensions(width: u32, height: u32) -> Self {
        Self::InvalidCropDimensions { width, height }
    }

    pub fn invalid_rotation_angle(degrees: i32) -> Self {
        Self::InvalidRotationAngle { degrees }
    }

    pub fn invalid_resize_dimensions(width: Option<u32>, height: Option<u32>) -> Self {
        Self::InvalidResizeDimensions { width, height }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn pixel_out_of_bounds(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::PixelOutOfBounds {
            x,
            y,
            width,
            height,
        }
    }

    pub fn no_icon_sizes() -> Self {
        Self::NoIconSizes
    }

    pub fn invalid_icon_size(size: u32, max: u32) -> Self {
        Self::InvalidIconSize { size, max }
    }

    pub fn no_input_images(operation: impl Into<Cow<'static, str>>) -> Self {
        Self::NoInputImages {
            operation: operation.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_preset(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPreset { name: name.into() }
    }

    pub fn invalid_limit_policy(policy: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidLimitPolicy {
            policy: policy.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable,
    /// CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            // UserError: Invalid input, recoverable
            Self::FileNotFound { .. }
            | Self::InvalidCropBounds { .. }
            | Self::InvalidCropDimensions { .. }
            | Self::InvalidRotationAngle { .. }
            | Self::InvalidResizeDimensions { .. }
            | Self::PixelOutOfBounds { .. }
            | Self::NoIconSizes
            | Self::InvalidIconSize { .. }
            | Self::NoInputImages { .. }
            | Self::InvalidPreset { .. }
            | Self::InvalidLimitPolicy { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            // CodecError: Format/encoding issues
            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::CorruptedImage
            | Self::MalformedIco { .. }
            | Self::EncodeFailed { .. }
            // Resize failures are processing failures of the same kind as codec failures.
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            // ResourceLimit: Memory/time/dimension limits
            // File I/O failures land here too: disk full, permissions and locks are
            // all fixable on the caller's side.
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::LimitViolation { .. }
            | Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            // InternalBug: Library bugs (should not happen)
            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Errors from the image crate's decoders. Encoder call sites map their own errors.
impl From<image::ImageError> for ToolboxError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Self::unsupported_format(e.to_string()),
            image::ImageError::Limits(e) => Self::limit_violation(e.to_string()),
            image::ImageError::Encoding(e) => Self::encode_failed("image", e.to_string()),
            other => Self::decode_failed(other.to_string()),
        }
    }
}

// The JS side reads the category from the message prefix: `[IMGTOOLBOX_USER_ERROR] ...`
#[cfg(feature = "napi")]
impl From<ToolboxError> for napi::Error {
    fn from(err: ToolboxError) -> Self {
        let category = err.category();
        let status = match category {
            ErrorCategory::UserError | ErrorCategory::CodecError => Status::InvalidArg,
            ErrorCategory::ResourceLimit | ErrorCategory::InternalBug => Status::GenericFailure,
        };
        napi::Error::new(status, format!("[{}] {}", category.code(), err))
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ToolboxError>;
