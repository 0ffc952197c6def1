//! # backdrop-governor
//!
//! Adaptive admission control for decorative background render effects.
//!
//! Several independently animating effects on one surface (a shader
//! backdrop, a character-rain canvas, ambient CSS motion) compete for the
//! same GPU/CPU budget. This crate supervises them: it decides,
//! continuously and without developer intervention, which effects may
//! render, at what quality, and at what frame rate — under an unknown
//! device tier, a fluctuating frame budget, a memory ceiling, a
//! concurrency cap, and the platform's reduced-motion preference.
//!
//! # Architecture
//!
//! ```text
//! Governor
//!   ├─> InstanceRegistry (entry ownership, cleanup-once lifecycle)
//!   ├─> VisibilityTracker (per-instance viewport watches, edge-triggered)
//!   ├─> PerformanceSampler (fps window, memory cadence, render timings)
//!   ├─> DeviceCapabilityProbe (one-shot async tier -> settings rewrite)
//!   └─> AdmissionController (degrade/restore passes with hysteresis)
//! ```
//!
//! Effects are opaque to the governor. Each one registers with a stable
//! id, a type tag, a priority, and a cleanup callback, then polls once
//! per animation frame — "am I active", "what frame rate", "what quality
//! scalar" — and decides on its own whether to draw. The governor never
//! calls an effect back, so a stalled effect cannot block scheduling.
//!
//! # Usage
//!
//! ```no_run
//! use backdrop_governor::{Config, Governor, RenderableKind};
//!
//! let governor = Governor::new(Config::default());
//!
//! governor.register("hero-shader", RenderableKind::GpuShader, 10, || {
//!     // release GPU resources
//! });
//!
//! // In the effect's frame loop:
//! if governor.is_active("hero-shader") {
//!     let _quality = governor.optimal_quality("hero-shader");
//!     let _fps = governor.optimal_frame_rate("hero-shader");
//!     // draw, then report how long it took:
//!     governor.update_render_time("hero-shader", 4.2);
//! }
//!
//! // On teardown:
//! governor.unregister("hero-shader");
//! ```
//!
//! Platform capabilities (visibility source, memory probe, GPU tier
//! detector, clock) are traits with null implementations, injected via
//! [`Governor::builder`]; a missing capability degrades the relevant
//! signal to a neutral value instead of failing.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Governor configuration and mutable scheduling policy
pub mod config;

/// Event channel between platform sources and the evaluation loop
pub mod events;

/// The admission controller itself
pub mod governor;

/// Metrics snapshots and scheduler statistics
pub mod metrics;

/// Platform capability traits and their null/manual implementations
pub mod platform;

/// Device tier probing and the settings rewrite it drives
pub mod probe;

/// Instance registry types
pub mod registry;

mod sampler;
mod visibility;

pub use config::{Config, ConfigError, SamplerConfig, Settings, SettingsUpdate, VisibilityConfig};
pub use events::{GovernorEvent, Mailbox};
pub use governor::{Governor, GovernorBuilder};
pub use metrics::{MetricsSnapshot, SchedulerStats};
pub use platform::{
    Clock, GpuTierProbe, ManualClock, ManualVisibilityProvider, MemoryProbe, MonotonicClock,
    NullGpuTierProbe, NullMemoryProbe, NullVisibilityProvider, StaticGpuTierProbe,
    SystemMemoryProbe, VisibilityProvider, VisibilityWatch,
};
pub use registry::{InstanceInfo, RenderableKind, AUTO_ACTIVATE_PRIORITY};
