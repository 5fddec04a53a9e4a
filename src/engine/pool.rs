// src/engine/pool.rs
//
// Global thread pool for decoding independent inputs (collage frames, GIF frames).
//
// A single pool is created lazily on first use and reused for the life of the
// process. Changing IMGTOOLBOX_THREADS or UV_THREADPOOL_SIZE after that has no effect.
//
// Thread count:
// - std::thread::available_parallelism(), which respects cgroup/CPU quota
// - IMGTOOLBOX_THREADS overrides detection when set to a positive integer
// - with the napi feature, UV_THREADPOOL_SIZE threads (default 4) are left to libuv

use crate::engine::decoder::{decode_image, detect_exif_orientation};
use crate::engine::io::Source;
use crate::engine::limits::InputLimits;
use crate::engine::pipeline::apply_ops;
use crate::error::ToolboxError;
use crate::ops::Operation;
use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Environment variable that pins the pool size.
pub const THREADS_ENV: &str = "IMGTOOLBOX_THREADS";

/// Default libuv thread pool size (Node.js default)
#[cfg(feature = "napi")]
const DEFAULT_LIBUV_THREADPOOL_SIZE: usize = 4;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// The shared pool, or None if rayon could not start any threads.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = configured_threads();
            match rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("imgtoolbox-{i}"))
                .build()
            {
                Ok(pool) => {
                    tracing::debug!(target: "imgtoolbox::pool", num_threads, "thread pool initialized");
                    Some(pool)
                }
                Err(e) => {
                    tracing::warn!(target: "imgtoolbox::pool", error = %e, "thread pool unavailable, running inline");
                    None
                }
            }
        })
        .as_ref()
}

/// Number of threads the pool is (or will be) built with.
pub fn configured_threads() -> usize {
    if let Some(n) = env_threads() {
        return n;
    }
    let detected = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_RAYON_THREADS);
    detected
        .saturating_sub(reserved_libuv_threads())
        .max(MIN_RAYON_THREADS)
}

fn env_threads() -> Option<usize> {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

#[cfg(feature = "napi")]
fn reserved_libuv_threads() -> usize {
    std::env::var("UV_THREADPOOL_SIZE")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIBUV_THREADPOOL_SIZE)
}

#[cfg(not(feature = "napi"))]
fn reserved_libuv_threads() -> usize {
    0
}

/// Run `f` inside the global pool, or on the calling thread if there is none.
pub fn install<R, F>(f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match get_pool() {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Decode every source in parallel and return the images in input order.
///
/// Each input is checked against `limits` and, when `auto_orient` is set,
/// rotated upright from its EXIF orientation. The first failure wins.
pub fn decode_all(
    sources: &[Source],
    limits: &InputLimits,
    auto_orient: bool,
) -> Result<Vec<DynamicImage>, ToolboxError> {
    install(|| {
        sources
            .par_iter()
            .enumerate()
            .map(|(index, source)| {
                let img = decode_one(source, limits, auto_orient)?;
                tracing::trace!(target: "imgtoolbox::pool", index, "decoded input");
                Ok(img)
            })
            .collect()
    })
}

fn decode_one(
    source: &Source,
    limits: &InputLimits,
    auto_orient: bool,
) -> Result<DynamicImage, ToolboxError> {
    let bytes = source.bytes()?;
    limits.enforce_source_len(bytes.len())?;
    let (img, _) = decode_image(&bytes)?;
    let (w, h) = img.dimensions();
    limits.enforce_pixels(w, h)?;

    let orientation = if auto_orient {
        detect_exif_orientation(&bytes).filter(|&o| o > 1)
    } else {
        None
    };
    match orientation {
        Some(orientation) => {
            let ops = [Operation::AutoOrient { orientation }];
            Ok(apply_ops(Cow::Owned(img), &ops)?.into_owned())
        }
        None => Ok(img),
    }
}
