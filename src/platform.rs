//! Platform capability abstractions
//!
//! Every optional platform facility the governor consumes is a trait with
//! a null/no-op implementation, selected at construction:
//!
//! | Capability | Trait | Null impl | Real impl |
//! |---|---|---|---|
//! | Monotonic time | [`Clock`] | - | [`MonotonicClock`] |
//! | Heap memory | [`MemoryProbe`] | [`NullMemoryProbe`] | [`SystemMemoryProbe`] |
//! | GPU tier | [`GpuTierProbe`] | [`NullGpuTierProbe`] | host-provided |
//! | Viewport visibility | [`VisibilityProvider`] | [`NullVisibilityProvider`] | host-provided |
//!
//! This keeps feature-detection branching out of the scheduling core: a
//! missing capability degrades to a neutral value, never an error. The
//! manual implementations ([`ManualClock`], [`ManualVisibilityProvider`])
//! let tests and embedders drive time and visibility deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::VisibilityConfig;
use crate::events::Mailbox;

// ============================================================================
// Time
// ============================================================================

/// Monotonic time source with an arbitrary epoch.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock-backed [`Clock`] anchored at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is "now".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced [`Clock`] for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Create a clock at epoch zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }

    /// Jump the clock to an absolute offset from its epoch.
    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Heap-memory indicator.
pub trait MemoryProbe: Send + Sync {
    /// Current memory usage in MiB, or `None` when unavailable.
    fn memory_usage_mb(&self) -> Option<f64>;
}

/// Absent memory capability; sampled usage stays at its neutral zero.
#[derive(Debug, Default)]
pub struct NullMemoryProbe;

impl MemoryProbe for NullMemoryProbe {
    fn memory_usage_mb(&self) -> Option<f64> {
        None
    }
}

/// Process-resident-set probe backed by `sysinfo`.
pub struct SystemMemoryProbe {
    system: Mutex<sysinfo::System>,
    pid: Option<sysinfo::Pid>,
}

impl SystemMemoryProbe {
    /// Create a probe for the current process.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn memory_usage_mb(&self) -> Option<f64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
    }
}

// ============================================================================
// GPU tier
// ============================================================================

/// Best-effort device rendering tier estimator.
///
/// Detection is asynchronous and one-shot; a failing probe falls back to
/// the pixel-ratio heuristic in [`crate::probe`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GpuTierProbe: Send + Sync {
    /// Estimate the device tier (1 = weak .. 4 = high-end).
    async fn detect_tier(&self) -> anyhow::Result<u8>;

    /// Device pixel ratio consulted when [`Self::detect_tier`] fails.
    fn device_pixel_ratio(&self) -> f64;
}

/// Absent GPU capability: detection always fails, pixel ratio 1.0, so the
/// fallback heuristic lands on the conservative tier.
#[derive(Debug, Default)]
pub struct NullGpuTierProbe;

#[async_trait]
impl GpuTierProbe for NullGpuTierProbe {
    async fn detect_tier(&self) -> anyhow::Result<u8> {
        anyhow::bail!("gpu tier detection unavailable")
    }

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }
}

/// Fixed-answer probe for hosts that already know their tier.
#[derive(Debug, Clone)]
pub struct StaticGpuTierProbe {
    tier: u8,
    pixel_ratio: f64,
}

impl StaticGpuTierProbe {
    /// Probe that always reports `tier`.
    pub fn new(tier: u8) -> Self {
        Self {
            tier,
            pixel_ratio: 1.0,
        }
    }

    /// Override the reported device pixel ratio.
    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }
}

#[async_trait]
impl GpuTierProbe for StaticGpuTierProbe {
    async fn detect_tier(&self) -> anyhow::Result<u8> {
        Ok(self.tier)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Handle for one instance's viewport observation.
pub trait VisibilityWatch: Send + Sync {
    /// Stop observing. No events for the id are delivered afterwards.
    fn disconnect(&mut self);
}

/// Platform source of viewport-intersection transitions.
///
/// A provider that cannot observe (headless, no compositor) returns `None`
/// from [`Self::watch`]; such instances are never auto-activated by
/// visibility and rely on priority bootstrapping alone.
pub trait VisibilityProvider: Send + Sync {
    /// Begin observing `id`, posting transitions into `mailbox`.
    fn watch(
        &self,
        id: &str,
        config: &VisibilityConfig,
        mailbox: Mailbox,
    ) -> Option<Box<dyn VisibilityWatch>>;
}

/// Headless provider: observation is unavailable.
#[derive(Debug, Default)]
pub struct NullVisibilityProvider;

impl VisibilityProvider for NullVisibilityProvider {
    fn watch(
        &self,
        _id: &str,
        _config: &VisibilityConfig,
        _mailbox: Mailbox,
    ) -> Option<Box<dyn VisibilityWatch>> {
        None
    }
}

/// Hand-driven visibility source for tests and embedders.
///
/// `watch` registers the id; [`Self::set_visible`] posts the transition
/// into the governor's mailbox exactly like a platform observer would.
#[derive(Clone, Default)]
pub struct ManualVisibilityProvider {
    watched: Arc<Mutex<HashMap<String, Mailbox>>>,
}

impl ManualVisibilityProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an intersection transition. Returns `false` for ids that
    /// are not currently watched.
    pub fn set_visible(&self, id: &str, visible: bool) -> bool {
        let watched = self.watched.lock();
        match watched.get(id) {
            Some(mailbox) => {
                mailbox.visibility_changed(id, visible);
                true
            }
            None => false,
        }
    }

    /// Whether `id` currently has an attached watch.
    pub fn is_watched(&self, id: &str) -> bool {
        self.watched.lock().contains_key(id)
    }
}

impl VisibilityProvider for ManualVisibilityProvider {
    fn watch(
        &self,
        id: &str,
        _config: &VisibilityConfig,
        mailbox: Mailbox,
    ) -> Option<Box<dyn VisibilityWatch>> {
        self.watched.lock().insert(id.to_string(), mailbox);
        Some(Box::new(ManualWatch {
            id: id.to_string(),
            watched: Arc::clone(&self.watched),
        }))
    }
}

struct ManualWatch {
    id: String,
    watched: Arc<Mutex<HashMap<String, Mailbox>>>,
}

impl VisibilityWatch for ManualWatch {
    fn disconnect(&mut self) {
        self.watched.lock().remove(&self.id);
    }
}
