// src/engine/limits.rs
//
// Input limits: per-invocation caps on input bytes, decoded pixels and wall-clock time.

use crate::error::ToolboxError;
use std::time::Instant;

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const LENIENT_MAX_PIXELS: u64 = 75_000_000; // generous but below global MAX_PIXELS
const STRICT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const LENIENT_MAX_BYTES: u64 = 48 * 1024 * 1024;
const STRICT_TIMEOUT_MS: u64 = 5_000;
const LENIENT_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitPolicy {
    #[default]
    Disabled,
    Strict,
    Lenient,
    Custom,
}

impl LimitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitPolicy::Disabled => "disabled",
            LimitPolicy::Strict => "strict",
            LimitPolicy::Lenient => "lenient",
            LimitPolicy::Custom => "custom",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputLimits {
    pub policy: LimitPolicy,
    pub max_pixels: Option<u64>,
    pub max_bytes: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl InputLimits {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            policy: LimitPolicy::Strict,
            max_pixels: Some(STRICT_MAX_PIXELS),
            max_bytes: Some(STRICT_MAX_BYTES),
            timeout_ms: Some(STRICT_TIMEOUT_MS),
        }
    }

    pub fn lenient() -> Self {
        Self {
            policy: LimitPolicy::Lenient,
            max_pixels: Some(LENIENT_MAX_PIXELS),
            max_bytes: Some(LENIENT_MAX_BYTES),
            timeout_ms: Some(LENIENT_TIMEOUT_MS),
        }
    }

    /// Enabled, with no caps until the caller sets them.
    pub fn custom() -> Self {
        Self {
            policy: LimitPolicy::Custom,
            ..Self::default()
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ToolboxError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::strict()),
            "lenient" => Ok(Self::lenient()),
            "disabled" | "none" | "off" => Ok(Self::disabled()),
            _ => Err(ToolboxError::invalid_limit_policy(name.to_string())),
        }
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.enable_custom();
        self.max_pixels = Some(max_pixels);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.enable_custom();
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.enable_custom();
        self.timeout_ms = Some(timeout_ms);
        self
    }

    // Overriding a cap on a disabled policy turns it into a custom one.
    fn enable_custom(&mut self) {
        if self.policy == LimitPolicy::Disabled {
            self.policy = LimitPolicy::Custom;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy != LimitPolicy::Disabled
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<(), ToolboxError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if let Some(limit) = self.max_bytes {
            let len_u64 = len as u64;
            if len_u64 > limit {
                tracing::warn!(target: "imgtoolbox::limits", len = len_u64, limit, "input too large");
                return Err(ToolboxError::limit_violation(format!(
                    "input size {} bytes exceeds limit of {} bytes ({} policy)",
                    len_u64,
                    limit,
                    self.policy.as_str()
                )));
            }
        }
        Ok(())
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> Result<(), ToolboxError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if let Some(limit) = self.max_pixels {
            let pixels = width as u64 * height as u64;
            if pixels > limit {
                tracing::warn!(target: "imgtoolbox::limits", width, height, limit, "too many pixels");
                return Err(ToolboxError::limit_violation(format!(
                    "{}x{} ({} pixels) exceeds limit of {} pixels ({} policy)",
                    width,
                    height,
                    pixels,
                    limit,
                    self.policy.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Checked between stages; a running codec call is never interrupted.
    pub fn enforce_timeout(
        &self,
        started_at: Instant,
        stage: &'static str,
    ) -> Result<(), ToolboxError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if let Some(limit_ms) = self.timeout_ms {
            let elapsed_ms = started_at.elapsed().as_millis() as u64;
            if elapsed_ms > limit_ms {
                tracing::warn!(target: "imgtoolbox::limits", stage, elapsed_ms, limit_ms, "time budget exceeded");
                return Err(ToolboxError::limit_violation(format!(
                    "processing exceeded {}ms budget at {} stage (elapsed: {}ms)",
                    limit_ms, stage, elapsed_ms
                )));
            }
        }
        Ok(())
    }
}
