// src/engine/tasks.rs
//
// Self-contained jobs. Each one owns everything it needs (no borrowed data), so
// it can run synchronously from Rust via `run()` or on the libuv pool as a NAPI
// AsyncTask without blocking the JS thread.

use crate::codecs::ico::IconFile;
use crate::engine::animation::{make_gif, GifOptions};
use crate::engine::compose::{compose_collage, CollageOptions};
use crate::engine::decoder::{decode_image, detect_exif_orientation, ensure_dimensions_safe};
use crate::engine::encoder::encode;
use crate::engine::icon::build_icon;
use crate::engine::io::{write_atomic, Source};
use crate::engine::limits::InputLimits;
use crate::engine::pipeline::apply_ops;
use crate::engine::pool::decode_all;
use crate::error::ToolboxError;
use crate::ops::{IconOptions, Operation, OutputFormat};
use image::{DynamicImage, GenericImageView};
#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;
#[cfg(feature = "napi")]
use napi::{Env, Task};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Instant;

type TaskResult<T> = std::result::Result<T, ToolboxError>;

/// Decode one source and run its queued operations.
#[derive(Clone, Debug)]
pub struct ProcessJob {
    pub source: Source,
    pub ops: Vec<Operation>,
    pub auto_orient: bool,
    pub limits: InputLimits,
}

impl ProcessJob {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            ops: Vec::new(),
            auto_orient: true,
            limits: InputLimits::default(),
        }
    }

    /// decode -> auto-orient -> ops, checking limits between stages.
    pub fn process(&self, started_at: Instant) -> TaskResult<DynamicImage> {
        let bytes = self.source.bytes()?;
        self.limits.enforce_source_len(bytes.len())?;
        ensure_dimensions_safe(&bytes)?;

        let (img, _format) = decode_image(&bytes)?;
        let (w, h) = img.dimensions();
        self.limits.enforce_pixels(w, h)?;
        self.limits.enforce_timeout(started_at, "decode")?;

        let mut effective_ops = Vec::with_capacity(self.ops.len() + 1);
        if self.auto_orient {
            if let Some(orientation) = detect_exif_orientation(&bytes).filter(|&o| o > 1) {
                // Normalize before any user operation sees the pixels
                effective_ops.push(Operation::AutoOrient { orientation });
            }
        }
        effective_ops.extend(self.ops.iter().cloned());

        let processed = apply_ops(Cow::Owned(img), &effective_ops)?.into_owned();
        self.limits.enforce_timeout(started_at, "process")?;
        Ok(processed)
    }
}

/// Process then encode to a buffer.
pub struct EncodeTask {
    pub job: ProcessJob,
    pub format: OutputFormat,
}

impl EncodeTask {
    pub fn run(&self) -> TaskResult<Vec<u8>> {
        let started_at = Instant::now();
        let processed = self.job.process(started_at)?;
        let out = encode(&processed, &self.format)?;
        self.job.limits.enforce_timeout(started_at, "encode")?;
        Ok(out)
    }
}

/// Process, encode and atomically write to `output_path`. Yields bytes written.
pub struct WriteFileTask {
    pub job: ProcessJob,
    pub format: OutputFormat,
    pub output_path: PathBuf,
}

impl WriteFileTask {
    pub fn run(&self) -> TaskResult<u64> {
        let data = EncodeTask {
            job: self.job.clone(),
            format: self.format.clone(),
        }
        .run()?;
        write_atomic(&self.output_path, &data)
    }
}

/// Process then build a multi-resolution ICO.
pub struct IconTask {
    pub job: ProcessJob,
    pub sizes: Vec<u32>,
    pub options: IconOptions,
}

impl IconTask {
    pub fn run(&self) -> TaskResult<IconFile> {
        let started_at = Instant::now();
        let processed = self.job.process(started_at)?;
        let icon = build_icon(&processed, &self.sizes, self.options)?;
        self.job.limits.enforce_timeout(started_at, "encode")?;
        Ok(icon)
    }
}

/// Decode all inputs in parallel, stitch them, encode the result.
pub struct CollageTask {
    pub sources: Vec<Source>,
    pub options: CollageOptions,
    pub format: OutputFormat,
    pub auto_orient: bool,
    pub limits: InputLimits,
}

impl CollageTask {
    pub fn run(&self) -> TaskResult<Vec<u8>> {
        if self.sources.is_empty() {
            return Err(ToolboxError::no_input_images("collage"));
        }
        let started_at = Instant::now();
        let images = decode_all(&self.sources, &self.limits, self.auto_orient)?;
        self.limits.enforce_timeout(started_at, "decode")?;

        let canvas = compose_collage(&images, &self.options)?;
        self.limits.enforce_pixels(canvas.width(), canvas.height())?;
        self.limits.enforce_timeout(started_at, "process")?;

        let out = encode(&DynamicImage::ImageRgba8(canvas), &self.format)?;
        self.limits.enforce_timeout(started_at, "encode")?;
        Ok(out)
    }
}

/// Decode all inputs in parallel and assemble an animated GIF.
pub struct AnimationTask {
    pub sources: Vec<Source>,
    pub options: GifOptions,
    pub auto_orient: bool,
    pub limits: InputLimits,
}

impl AnimationTask {
    pub fn run(&self) -> TaskResult<Vec<u8>> {
        if self.sources.is_empty() {
            return Err(ToolboxError::no_input_images("gif"));
        }
        let started_at = Instant::now();
        let images = decode_all(&self.sources, &self.limits, self.auto_orient)?;
        self.limits.enforce_timeout(started_at, "decode")?;
        let gif = make_gif(&images, &self.options)?;
        self.limits.enforce_timeout(started_at, "encode")?;
        Ok(gif)
    }
}

#[cfg(feature = "napi")]
#[napi]
impl Task for EncodeTask {
    type Output = Vec<u8>;
    type JsValue = Buffer;

    fn compute(&mut self) -> Result<Self::Output> {
        self.run().map_err(napi::Error::from)
    }

    fn resolve(&mut self, _env: Env, output: Self::Output) -> Result<Self::JsValue> {
        Ok(output.into())
    }
}

#[cfg(feature = "napi")]
#[napi]
impl Task for IconTask {
    type Output = IconFile;
    type JsValue = Buffer;

    fn compute(&mut self) -> Result<Self::Output> {
        self.run().map_err(napi::Error::from)
    }

    fn resolve(&mut self, _env: Env, output: Self::Output) -> Result<Self::JsValue> {
        Ok(output.into_bytes().into())
    }
}

#[cfg(feature = "napi")]
#[napi]
impl Task for CollageTask {
    type Output = Vec<u8>;
    type JsValue = Buffer;

    fn compute(&mut self) -> Result<Self::Output> {
        self.run().map_err(napi::Error::from)
    }

    fn resolve(&mut self, _env: Env, output: Self::Output) -> Result<Self::JsValue> {
        Ok(output.into())
    }
}

#[cfg(feature = "napi")]
#[napi]
impl Task for AnimationTask {
    type Output = Vec<u8>;
    type JsValue = Buffer;

    fn compute(&mut self) -> Result<Self::Output> {
        self.run().map_err(napi::Error::from)
    }

    fn resolve(&mut self, _env: Env, output: Self::Output) -> Result<Self::JsValue> {
        Ok(output.into())
    }
}
