//! Configuration management
//!
//! Handles loading, validation, and runtime mutation of governor policy:
//! - TOML files ([`Config::load`])
//! - Programmatic defaults ([`Config::default`])
//! - Partial runtime updates ([`SettingsUpdate`])
//!
//! [`Settings`] is the mutable scheduling policy the admission controller
//! consults on every pass. It is initialized from the `[scheduler]` config
//! section, refined at most once by the device capability probe, and
//! mutable thereafter through `Governor::update_settings`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Validation failure for a governor configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The concurrency cap must admit at least one instance.
    #[error("max_active_backgrounds must be >= 1 (got {0})")]
    InvalidMaxActive(u32),

    /// A zero frame-rate target makes every band degenerate.
    #[error("target_fps must be > 0 (got {0})")]
    InvalidTargetFps(u32),

    /// The memory ceiling must be positive.
    #[error("memory_threshold_mb must be > 0 (got {0})")]
    InvalidMemoryThreshold(f64),

    /// Reserved knob, still range-checked so configs stay portable.
    #[error("gpu_threshold must be within 0.0..=1.0 (got {0})")]
    InvalidGpuThreshold(f64),

    /// Intersection ratio outside what any viewport can report.
    #[error("visibility threshold must be within 0.0..=1.0 and non-zero (got {0})")]
    InvalidVisibilityThreshold(f32),

    /// A zero-length sampling window cannot produce a rate.
    #[error("sampler windows must be non-zero")]
    InvalidSamplerWindow,
}

/// Mutable global scheduling policy (`[scheduler]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Concurrency cap: how many instances may be active at once.
    #[serde(default = "default_max_active")]
    pub max_active_backgrounds: u32,

    /// Global frame-rate target used by the hysteresis bands.
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    /// Enable the periodic degrade/restore passes (false = admission only).
    #[serde(default = "default_adaptive_quality")]
    pub adaptive_quality: bool,

    /// Heap ceiling in MiB; sampled memory above this triggers degrade.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_mb: f64,

    /// Reserved GPU budget fraction (0.0 - 1.0), not consulted yet.
    #[serde(default = "default_gpu_threshold")]
    pub gpu_threshold: f64,

    /// Mirrors the platform's reduced-motion accessibility preference.
    #[serde(default)]
    pub reduced_motion_mode: bool,
}

fn default_max_active() -> u32 {
    2
}
fn default_target_fps() -> u32 {
    60
}
fn default_adaptive_quality() -> bool {
    true
}
fn default_memory_threshold() -> f64 {
    512.0
}
fn default_gpu_threshold() -> f64 {
    0.5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_active_backgrounds: default_max_active(),
            target_fps: default_target_fps(),
            adaptive_quality: default_adaptive_quality(),
            memory_threshold_mb: default_memory_threshold(),
            gpu_threshold: default_gpu_threshold(),
            reduced_motion_mode: false,
        }
    }
}

impl Settings {
    /// Validate field ranges.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_active_backgrounds < 1 {
            return Err(ConfigError::InvalidMaxActive(self.max_active_backgrounds));
        }
        if self.target_fps == 0 {
            return Err(ConfigError::InvalidTargetFps(self.target_fps));
        }
        if self.memory_threshold_mb <= 0.0 {
            return Err(ConfigError::InvalidMemoryThreshold(self.memory_threshold_mb));
        }
        if !(0.0..=1.0).contains(&self.gpu_threshold) {
            return Err(ConfigError::InvalidGpuThreshold(self.gpu_threshold));
        }
        Ok(())
    }

    /// Apply a partial update, leaving unset fields untouched.
    pub fn merge(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.max_active_backgrounds {
            self.max_active_backgrounds = v;
        }
        if let Some(v) = update.target_fps {
            self.target_fps = v;
        }
        if let Some(v) = update.adaptive_quality {
            self.adaptive_quality = v;
        }
        if let Some(v) = update.memory_threshold_mb {
            self.memory_threshold_mb = v;
        }
        if let Some(v) = update.gpu_threshold {
            self.gpu_threshold = v;
        }
        if let Some(v) = update.reduced_motion_mode {
            self.reduced_motion_mode = v;
        }
    }
}

/// Partial [`Settings`] update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// New concurrency cap.
    pub max_active_backgrounds: Option<u32>,
    /// New frame-rate target.
    pub target_fps: Option<u32>,
    /// Toggle the periodic degrade/restore passes.
    pub adaptive_quality: Option<bool>,
    /// New heap ceiling in MiB.
    pub memory_threshold_mb: Option<f64>,
    /// Reserved GPU budget fraction.
    pub gpu_threshold: Option<f64>,
    /// Reduced-motion accessibility preference.
    pub reduced_motion_mode: Option<bool>,
}

/// Viewport intersection parameters (`[visibility]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Intersection ratio at which an instance counts as visible.
    #[serde(default = "default_visibility_threshold")]
    pub threshold: f32,

    /// Pre-trigger margin in pixels, so effects start slightly before
    /// the element scrolls fully on-screen.
    #[serde(default = "default_margin_px")]
    pub margin_px: f32,
}

fn default_visibility_threshold() -> f32 {
    0.1
}
fn default_margin_px() -> f32 {
    50.0
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            threshold: default_visibility_threshold(),
            margin_px: default_margin_px(),
        }
    }
}

impl VisibilityConfig {
    /// Validate field ranges.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidVisibilityThreshold(self.threshold));
        }
        Ok(())
    }
}

/// Sampling cadences (`[sampler]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Rolling frame-rate window in milliseconds.
    #[serde(default = "default_fps_window_ms")]
    pub fps_window_ms: u64,

    /// How often the heap-memory indicator is polled, in milliseconds.
    #[serde(default = "default_memory_poll_ms")]
    pub memory_poll_interval_ms: u64,
}

fn default_fps_window_ms() -> u64 {
    1000
}
fn default_memory_poll_ms() -> u64 {
    5000
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            fps_window_ms: default_fps_window_ms(),
            memory_poll_interval_ms: default_memory_poll_ms(),
        }
    }
}

impl SamplerConfig {
    /// Validate field ranges.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.fps_window_ms == 0 || self.memory_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidSamplerWindow);
        }
        Ok(())
    }
}

/// Complete governor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling policy.
    #[serde(default)]
    pub scheduler: Settings,
    /// Viewport intersection parameters.
    #[serde(default)]
    pub visibility: VisibilityConfig,
    /// Sampling cadences.
    #[serde(default)]
    pub sampler: SamplerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.visibility.validate()?;
        self.sampler.validate()?;
        Ok(())
    }
}
