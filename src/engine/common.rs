// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Codec libraries (libjpeg, libwebp) can panic on hostile input; every
// decode/encode entrypoint runs under `run_with_panic_policy` so a panic
// becomes an `InternalPanic` error instead of unwinding into the caller.

use crate::error::ToolboxError;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Unified Result type for engine internals.
pub type EngineResult<T> = std::result::Result<T, ToolboxError>;

/// Run `f`, converting a panic into `ToolboxError::InternalPanic` tagged with `label`.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            tracing::error!(target: "imgtoolbox::engine", label, detail = %detail, "codec panicked");
            Err(ToolboxError::internal_panic(format!(
                "{label}: panic during processing: {detail}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
