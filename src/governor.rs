//! Quality governor (admission controller)
//!
//! The scheduling core: decides from registry state, sampled metrics, and
//! policy settings which renderables may draw, at what quality scalar,
//! and at what frame-rate target.
//!
//! # Evaluation model
//!
//! Two paths mutate admission state, both serialized through the
//! governor's state lock:
//!
//! - **Edge-triggered**: a visibility transition or settings change
//!   re-evaluates the eligibility predicate. A newly eligible instance is
//!   admitted only if capacity remains; it never evicts another instance.
//! - **Periodic**: closing each frame-rate sampling window runs a
//!   degrade/restore pass (only while `adaptive_quality` is on).
//!
//! | Band | Condition | Action |
//! |------|-----------|--------|
//! | Degrade | fps < 0.8 x target, or memory over threshold, or count over cap | deactivate lowest priority |
//! | Hold | 0.8 x target <= fps < 0.95 x target | none |
//! | Restore | fps >= 0.95 x target and memory < 0.8 x threshold | activate highest-priority visible |
//!
//! The dead band between 80% and 95% of the target prevents activate/
//! deactivate churn when the frame rate hovers near the boundary.
//!
//! # Polling contract
//!
//! Renderables are never called back. Once per animation frame they ask
//! [`Governor::is_active`], [`Governor::optimal_frame_rate`], and
//! [`Governor::optimal_quality`], and decide for themselves whether and
//! how to draw. A stalled effect therefore cannot block the governor or
//! its siblings. All queries return conservative defaults for unknown
//! ids; nothing here throws under normal operation.

use parking_lot::RwLock;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::{Config, Settings, SettingsUpdate};
use crate::events::{self, GovernorEvent, Mailbox};
use crate::metrics::{MetricsSnapshot, MetricsState, SchedulerStats};
use crate::platform::{
    Clock, GpuTierProbe, MemoryProbe, MonotonicClock, NullMemoryProbe, NullVisibilityProvider,
    StaticGpuTierProbe, VisibilityProvider,
};
use crate::probe::{self, DEFAULT_GPU_TIER};
use crate::registry::{
    run_cleanup, CleanupFn, InstanceInfo, InstanceRegistry, RenderableInstance, RenderableKind,
    AUTO_ACTIVATE_PRIORITY,
};
use crate::sampler::PerformanceSampler;
use crate::visibility::VisibilityTracker;

/// Admission controller for decorative background render effects.
///
/// Explicitly constructed and owned (no global state); clone the
/// surrounding [`Arc`] to hand a polling handle to each effect. All
/// methods are callable from any thread; internal state is serialized by
/// a single lock, so evaluation order matches call order.
pub struct Governor {
    inner: RwLock<Inner>,
    mailbox: Mailbox,
    events: crossbeam_channel::Receiver<GovernorEvent>,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemoryProbe>,
    gpu: Arc<dyn GpuTierProbe>,
    shutdown_notify: Notify,
}

struct Inner {
    registry: InstanceRegistry,
    tracker: VisibilityTracker,
    sampler: PerformanceSampler,
    settings: Settings,
    metrics: MetricsState,
    stats: SchedulerStats,
    foreground: bool,
    gpu_tier: u8,
    tier_applied: bool,
    shutdown: bool,
}

impl Governor {
    /// Create a governor with the given configuration and default
    /// platform capabilities (monotonic clock, no memory/visibility
    /// sources, mid-range GPU tier).
    pub fn new(config: Config) -> Arc<Self> {
        Self::builder().config(config).build()
    }

    /// Start building a governor with injected platform capabilities.
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::new()
    }

    /// Cloneable sender for platform events (visibility transitions,
    /// foreground changes).
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a renderable. Idempotent per id: a duplicate is a warned
    /// no-op that leaves the existing entry untouched and drops the new
    /// cleanup without calling it.
    ///
    /// Instances registered at or above [`AUTO_ACTIVATE_PRIORITY`] are
    /// admitted immediately when capacity remains, before any visibility
    /// signal arrives.
    pub fn register(
        &self,
        id: &str,
        kind: RenderableKind,
        priority: i32,
        cleanup: impl FnOnce() + Send + 'static,
    ) {
        let mut inner = self.inner.write();
        if inner.shutdown {
            warn!("register('{}') after shutdown ignored", id);
            return;
        }
        if !inner.registry.insert(id, kind, priority, Box::new(cleanup)) {
            inner.stats.duplicate_registrations += 1;
            return;
        }
        let observed = inner.tracker.watch(id, &self.mailbox);
        if let Some(entry) = inner.registry.get_mut(id) {
            entry.has_observer = observed;
        }
        debug!(
            "registered '{}' ({:?}, priority {}, observer: {})",
            id, kind, priority, observed
        );

        let cap = inner.settings.max_active_backgrounds as usize;
        if priority >= AUTO_ACTIVATE_PRIORITY && inner.registry.active_count() < cap {
            inner.activate(id, "bootstrap");
        }
    }

    /// Unregister a renderable: disconnects its visibility watch, removes
    /// the entry, and invokes its cleanup exactly once. Unknown ids are a
    /// no-op; calling during teardown of a never-activated instance is
    /// safe.
    pub fn unregister(&self, id: &str) {
        let cleanup: Option<CleanupFn> = {
            let mut inner = self.inner.write();
            inner.tracker.unwatch(id);
            inner.registry.remove(id).and_then(|e| e.take_cleanup())
        };
        // Run outside the state lock so a cleanup may call back into the
        // governor without deadlocking.
        if let Some(cb) = cleanup {
            debug!("unregistered '{}'", id);
            if run_cleanup(id, cb) {
                self.inner.write().stats.cleanup_panics += 1;
            }
        }
    }

    /// (Re)attach a visibility watch for `id`. Returns `false` when the
    /// platform has no visibility source (headless) or the id is unknown.
    pub fn observe_visibility(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        if !inner.registry.contains(id) {
            return false;
        }
        let observed = inner.tracker.watch(id, &self.mailbox);
        if let Some(entry) = inner.registry.get_mut(id) {
            entry.has_observer = observed;
        }
        observed
    }

    // ========================================================================
    // Per-frame queries (pure, no scheduling side effects)
    // ========================================================================

    /// Whether the instance is currently permitted to render. Unknown ids
    /// report `false`.
    pub fn is_active(&self, id: &str) -> bool {
        self.inner
            .read()
            .registry
            .get(id)
            .map(|e| e.is_active)
            .unwrap_or(false)
    }

    /// Frame-pacing hint: the global target scaled by priority, never
    /// below half the target. Unknown ids get the unscaled target.
    pub fn optimal_frame_rate(&self, id: &str) -> u32 {
        let inner = self.inner.read();
        let target = f64::from(inner.settings.target_fps);
        match inner.registry.get(id) {
            Some(e) => (target * (f64::from(e.priority) / 10.0).max(0.5)).round() as u32,
            None => inner.settings.target_fps,
        }
    }

    /// Resolution/complexity scalar in `[0.3, 1.0]` reflecting current
    /// frame-rate, memory, concurrency, and device-tier pressure. Unknown
    /// ids get exactly `1.0`.
    pub fn optimal_quality(&self, id: &str) -> f64 {
        let inner = self.inner.read();
        if !inner.registry.contains(id) {
            return 1.0;
        }
        inner.quality_scalar()
    }

    /// Global accessibility flag, mirrored from settings.
    pub fn should_use_reduced_motion(&self) -> bool {
        self.inner.read().settings.reduced_motion_mode
    }

    /// Store a self-reported render duration. Observability only; no
    /// scheduling side effects. Unknown ids are a no-op.
    pub fn update_render_time(&self, id: &str, ms: f64) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.registry.get_mut(id) {
            entry.last_render_time_ms = ms;
            inner.metrics.render_time_ms = ms;
        }
    }

    // ========================================================================
    // Sampling and evaluation
    // ========================================================================

    /// Count one animation frame on the governor's sampling clock. When
    /// the rolling window closes this computes fps and, with
    /// `adaptive_quality` on, runs the periodic degrade/restore pass.
    pub fn record_frame(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if inner.shutdown {
            return;
        }
        if inner.sampler.memory_poll_due(now) {
            if let Some(mb) = self.memory.memory_usage_mb() {
                inner.metrics.memory_usage_mb = mb;
            }
        }
        if let Some(fps) = inner.sampler.record_frame(now) {
            inner.metrics.fps = fps;
            if inner.settings.adaptive_quality {
                inner.periodic_pass();
            }
        }
    }

    /// Drain queued platform events, evaluating each in arrival order.
    pub fn process_events(&self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    /// Report a foreground/background transition of the hosting surface.
    /// Equivalent to posting [`GovernorEvent::ForegroundChanged`].
    pub fn set_foreground(&self, foreground: bool) {
        self.handle_event(GovernorEvent::ForegroundChanged(foreground));
    }

    fn handle_event(&self, event: GovernorEvent) {
        let mut inner = self.inner.write();
        if inner.shutdown {
            return;
        }
        match event {
            GovernorEvent::VisibilityChanged { id, visible } => {
                match inner.registry.get_mut(&id) {
                    Some(entry) => {
                        entry.saw_visibility = true;
                        entry.is_visible = visible;
                    }
                    // Stale event for an id unregistered while in flight.
                    None => return,
                }
                inner.evaluate_instance(&id);
            }
            GovernorEvent::ForegroundChanged(foreground) => {
                if inner.foreground != foreground {
                    inner.foreground = foreground;
                    debug!(
                        "surface moved to {}",
                        if foreground { "foreground" } else { "background" }
                    );
                    inner.reconcile();
                }
            }
        }
    }

    // ========================================================================
    // Policy
    // ========================================================================

    /// Current scheduling policy.
    pub fn settings(&self) -> Settings {
        self.inner.read().settings.clone()
    }

    /// Merge a partial settings update and re-evaluate all instances.
    /// An update that would leave settings invalid is rejected with a
    /// warning and changes nothing.
    pub fn update_settings(&self, update: SettingsUpdate) {
        let mut inner = self.inner.write();
        if inner.shutdown {
            return;
        }
        let mut next = inner.settings.clone();
        next.merge(&update);
        match next.validate() {
            Ok(()) => {
                inner.settings = next;
                debug!(
                    "settings updated: max_active={} target_fps={} adaptive={} reduced_motion={}",
                    inner.settings.max_active_backgrounds,
                    inner.settings.target_fps,
                    inner.settings.adaptive_quality,
                    inner.settings.reduced_motion_mode
                );
                inner.reconcile();
            }
            Err(err) => warn!("rejected settings update: {}", err),
        }
    }

    /// Apply a resolved device tier. Effective at most once per governor
    /// lifetime; later calls are ignored.
    pub fn apply_gpu_tier(&self, tier: u8) {
        let mut inner = self.inner.write();
        if inner.tier_applied || inner.shutdown {
            return;
        }
        inner.tier_applied = true;
        inner.gpu_tier = tier.clamp(1, 4);
        let gpu_tier = inner.gpu_tier;
        if probe::apply_tier(&mut inner.settings, gpu_tier) {
            info!(
                "device tier {} applied: max_active={} target_fps={}",
                inner.gpu_tier, inner.settings.max_active_backgrounds, inner.settings.target_fps
            );
            let target = f64::from(inner.settings.target_fps);
            inner.metrics.reset_fps(target);
            inner.reconcile();
        } else {
            debug!("device tier {} leaves defaults untouched", inner.gpu_tier);
        }
    }

    /// Resolve the injected GPU probe (falling back to the pixel-ratio
    /// heuristic) and apply the tier. Runs the detection at most once.
    pub async fn run_device_probe(&self) {
        if self.inner.read().tier_applied {
            return;
        }
        let tier = probe::resolve_tier(self.gpu.as_ref()).await;
        self.apply_gpu_tier(tier);
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Snapshot of the most recent samples. Cheap to poll frequently;
    /// values only change on the sampler's own cadence.
    pub fn get_performance_metrics(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        MetricsSnapshot {
            fps: inner.metrics.fps,
            memory_usage_mb: inner.metrics.memory_usage_mb,
            render_time_ms: inner.metrics.render_time_ms,
            active_backgrounds: inner.registry.active_count(),
        }
    }

    /// Cumulative scheduling counters.
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.inner.read().stats
    }

    /// Reset the cumulative counters.
    pub fn reset_stats(&self) {
        self.inner.write().stats = SchedulerStats::default();
    }

    /// Diagnostic view of every registered instance, in registration
    /// order.
    pub fn instances(&self) -> Vec<InstanceInfo> {
        let inner = self.inner.read();
        let mut entries: Vec<&RenderableInstance> = inner.registry.iter().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|e| InstanceInfo {
                id: e.id.clone(),
                kind: e.kind,
                priority: e.priority,
                is_visible: e.is_visible,
                is_active: e.is_active,
                observed: e.has_observer,
                last_render_time_ms: e.last_render_time_ms,
            })
            .collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Tear down every remaining instance (cleanup exactly once each,
    /// observers disconnected) and stop the driver loop. Idempotent;
    /// subsequent registrations are ignored.
    pub fn shutdown(&self) {
        let cleanups: Vec<(String, CleanupFn)> = {
            let mut inner = self.inner.write();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
            inner.tracker.unwatch_all();
            inner
                .registry
                .drain()
                .into_iter()
                .filter_map(|e| {
                    let cb = e.take_cleanup()?;
                    Some((e.id, cb))
                })
                .collect()
        };
        for (id, cb) in cleanups {
            if run_cleanup(&id, cb) {
                self.inner.write().stats.cleanup_panics += 1;
            }
        }
        self.shutdown_notify.notify_waiters();
        info!("governor shut down");
    }

    /// Drive the governor from a tokio runtime: resolves the device probe
    /// once, then pumps queued events and frame samples at the configured
    /// target rate until [`Governor::shutdown`] is called.
    ///
    /// Hosts that drive their own frame loop should skip this and call
    /// [`Governor::process_events`] / [`Governor::record_frame`] from it
    /// instead.
    pub async fn run(&self) {
        self.run_device_probe().await;
        loop {
            let target = {
                let inner = self.inner.read();
                if inner.shutdown {
                    break;
                }
                inner.settings.target_fps.max(1)
            };
            let period = Duration::from_secs_f64(1.0 / f64::from(target));
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    self.process_events();
                    self.record_frame();
                }
                _ = self.shutdown_notify.notified() => break,
            }
        }
    }
}

impl Inner {
    /// The eligibility predicate. An instance that has never received a
    /// visibility signal counts as effectively visible while its priority
    /// meets the auto-activate threshold, so headless hosts keep working
    /// on priority alone; the first real signal switches the id to true
    /// visibility for good.
    fn entry_eligible(&self, entry: &RenderableInstance) -> bool {
        let effectively_visible = entry.is_visible
            || (!entry.saw_visibility && entry.priority >= AUTO_ACTIVATE_PRIORITY);
        effectively_visible && self.foreground && !self.settings.reduced_motion_mode
    }

    /// Edge-triggered evaluation of a single instance. Activation is
    /// capacity-bounded and never evicts; deactivation is immediate.
    fn evaluate_instance(&mut self, id: &str) {
        self.stats.evaluations += 1;
        let (is_active, eligible) = match self.registry.get(id) {
            Some(entry) => (entry.is_active, self.entry_eligible(entry)),
            None => return,
        };
        let cap = self.settings.max_active_backgrounds as usize;
        if is_active && !eligible {
            self.deactivate(id, "ineligible");
        } else if !is_active && eligible && self.registry.active_count() < cap {
            self.activate(id, "eligible");
        }
    }

    /// Periodic degrade/restore pass, fired by each closed fps window.
    fn periodic_pass(&mut self) {
        let target = f64::from(self.settings.target_fps);
        let cap = self.settings.max_active_backgrounds as usize;
        let fps = self.metrics.fps;
        let memory = self.metrics.memory_usage_mb;

        let degrade = fps < target * 0.8
            || memory > self.settings.memory_threshold_mb
            || self.registry.active_count() > cap;
        let restore =
            fps >= target * 0.95 && memory < self.settings.memory_threshold_mb * 0.8;

        if degrade {
            self.stats.degrade_passes += 1;
            debug!(
                "degrade pass: fps {:.1}/{:.0}, memory {:.0}MB, active {}/{}",
                fps,
                target,
                memory,
                self.registry.active_count(),
                cap
            );
            self.degrade_step();
            while self.registry.active_count() > cap {
                if !self.degrade_step() {
                    break;
                }
            }
        } else if restore {
            let mut restored = false;
            while self.registry.active_count() < cap {
                if !self.restore_step() {
                    break;
                }
                restored = true;
            }
            if restored {
                self.stats.restore_passes += 1;
            }
        }
        // Between 80% and 95% of target: hold, to avoid oscillation.
    }

    /// Deactivate the lowest-priority active instance (tie: earliest
    /// registration). Returns whether anything was deactivated.
    fn degrade_step(&mut self) -> bool {
        let victim = self
            .registry
            .iter()
            .filter(|e| e.is_active)
            .min_by_key(|e| (e.priority, e.seq))
            .map(|e| e.id.clone());
        match victim {
            Some(id) => {
                self.deactivate(&id, "degrade");
                true
            }
            None => false,
        }
    }

    /// Activate the highest-priority eligible inactive instance (tie:
    /// earliest registration). Returns whether anything was activated.
    fn restore_step(&mut self) -> bool {
        let candidate = self
            .registry
            .iter()
            .filter(|e| !e.is_active && self.entry_eligible(e))
            .min_by_key(|e| (Reverse(e.priority), e.seq))
            .map(|e| e.id.clone());
        match candidate {
            Some(id) => {
                self.activate(&id, "restore");
                true
            }
            None => false,
        }
    }

    /// Full re-evaluation after a policy or foreground change: shed
    /// ineligible actives, enforce the cap, then fill free capacity by
    /// priority.
    fn reconcile(&mut self) {
        let ineligible: Vec<String> = self
            .registry
            .iter()
            .filter(|e| e.is_active && !self.entry_eligible(e))
            .map(|e| e.id.clone())
            .collect();
        for id in ineligible {
            self.deactivate(&id, "reconcile");
        }
        let cap = self.settings.max_active_backgrounds as usize;
        while self.registry.active_count() > cap {
            if !self.degrade_step() {
                break;
            }
        }
        while self.registry.active_count() < cap {
            if !self.restore_step() {
                break;
            }
        }
    }

    fn activate(&mut self, id: &str, reason: &str) {
        if let Some(entry) = self.registry.get_mut(id) {
            if !entry.is_active {
                entry.is_active = true;
                self.stats.activations += 1;
                debug!("activated '{}' (priority {}, {})", id, entry.priority, reason);
            }
        }
    }

    fn deactivate(&mut self, id: &str, reason: &str) {
        if let Some(entry) = self.registry.get_mut(id) {
            if entry.is_active {
                entry.is_active = false;
                self.stats.deactivations += 1;
                debug!(
                    "deactivated '{}' (priority {}, {})",
                    id, entry.priority, reason
                );
            }
        }
    }

    fn quality_scalar(&self) -> f64 {
        let target = f64::from(self.settings.target_fps);
        let mut quality = 1.0;
        if self.metrics.fps < target * 0.8 {
            quality *= 0.7;
        }
        if self.metrics.memory_usage_mb > self.settings.memory_threshold_mb * 0.8 {
            quality *= 0.8;
        }
        if self.registry.active_count() > self.settings.max_active_backgrounds as usize {
            quality *= 0.6;
        }
        quality *= (f64::from(self.gpu_tier) / 2.0).min(1.0);
        quality.max(0.3)
    }
}

/// Builder for [`Governor`] with injectable platform capabilities.
pub struct GovernorBuilder {
    config: Config,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemoryProbe>,
    gpu: Arc<dyn GpuTierProbe>,
    visibility: Arc<dyn VisibilityProvider>,
}

impl GovernorBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            clock: Arc::new(MonotonicClock::new()),
            memory: Arc::new(NullMemoryProbe),
            gpu: Arc::new(StaticGpuTierProbe::new(DEFAULT_GPU_TIER)),
            visibility: Arc::new(NullVisibilityProvider),
        }
    }

    /// Use this configuration (policy, visibility, sampler sections).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Override just the scheduling policy section.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.config.scheduler = settings;
        self
    }

    /// Inject a time source (tests use [`crate::platform::ManualClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Inject a heap-memory probe.
    pub fn memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = memory;
        self
    }

    /// Inject a GPU tier probe, consumed once by
    /// [`Governor::run_device_probe`].
    pub fn gpu_probe(mut self, gpu: Arc<dyn GpuTierProbe>) -> Self {
        self.gpu = gpu;
        self
    }

    /// Inject a viewport-visibility source.
    pub fn visibility_provider(mut self, visibility: Arc<dyn VisibilityProvider>) -> Self {
        self.visibility = visibility;
        self
    }

    /// Construct the governor.
    pub fn build(self) -> Arc<Governor> {
        let (mailbox, events) = events::channel();
        let now = self.clock.now();
        let target = f64::from(self.config.scheduler.target_fps);
        let inner = Inner {
            registry: InstanceRegistry::default(),
            tracker: VisibilityTracker::new(self.visibility, self.config.visibility.clone()),
            sampler: PerformanceSampler::new(&self.config.sampler, now),
            metrics: MetricsState::new(target),
            settings: self.config.scheduler,
            stats: SchedulerStats::default(),
            foreground: true,
            gpu_tier: DEFAULT_GPU_TIER,
            tier_applied: false,
            shutdown: false,
        };
        info!(
            "governor initialized: max_active={} target_fps={} adaptive={}",
            inner.settings.max_active_backgrounds,
            inner.settings.target_fps,
            inner.settings.adaptive_quality
        );
        Arc::new(Governor {
            inner: RwLock::new(inner),
            mailbox,
            events,
            clock: self.clock,
            memory: self.memory,
            gpu: self.gpu,
            shutdown_notify: Notify::new(),
        })
    }
}

impl Default for GovernorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualClock, ManualVisibilityProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        governor: Arc<Governor>,
        clock: ManualClock,
        visibility: ManualVisibilityProvider,
    }

    fn harness(settings: Settings) -> Harness {
        let clock = ManualClock::new();
        let visibility = ManualVisibilityProvider::new();
        let governor = Governor::builder()
            .settings(settings)
            .clock(Arc::new(clock.clone()))
            .visibility_provider(Arc::new(visibility.clone()))
            .build();
        Harness {
            governor,
            clock,
            visibility,
        }
    }

    impl Harness {
        /// Close one fps window at the given measured rate.
        fn tick_with_fps(&self, fps: f64) {
            // One frame, then close the window after exactly 1s, then
            // backfill the frame count the rate implies.
            let frames = fps.round().max(1.0) as u64;
            for _ in 0..frames.saturating_sub(1) {
                self.governor.record_frame();
            }
            self.clock.advance(Duration::from_secs(1));
            self.governor.record_frame();
        }

        fn show(&self, id: &str) {
            self.visibility.set_visible(id, true);
            self.governor.process_events();
        }
    }

    fn noop() {}

    #[test]
    fn test_bootstrap_admission_without_visibility() {
        let h = harness(Settings::default());
        h.governor.register("hero", RenderableKind::GpuShader, 10, noop);
        assert!(h.governor.is_active("hero"));

        // Low priority stays out until a visibility signal arrives.
        h.governor.register("footer", RenderableKind::Canvas2d, 2, noop);
        assert!(!h.governor.is_active("footer"));
        h.show("footer");
        assert!(h.governor.is_active("footer"));
    }

    #[test]
    fn test_event_activation_respects_cap() {
        let mut settings = Settings::default();
        settings.max_active_backgrounds = 1;
        let h = harness(settings);

        h.governor.register("a", RenderableKind::Canvas2d, 3, noop);
        h.governor.register("b", RenderableKind::Canvas2d, 5, noop);
        h.show("a");
        h.show("b");

        // First-evaluated wins the only slot; b is not force-evicting a.
        assert!(h.governor.is_active("a"));
        assert!(!h.governor.is_active("b"));
    }

    #[test]
    fn test_degrade_picks_lowest_priority() {
        let mut settings = Settings::default();
        settings.max_active_backgrounds = 3;
        let h = harness(settings);

        h.governor.register("a", RenderableKind::Canvas2d, 1, noop);
        h.governor.register("b", RenderableKind::Canvas2d, 5, noop);
        h.governor.register("c", RenderableKind::Canvas2d, 9, noop);
        h.show("a");
        h.show("b");
        h.show("c");
        assert_eq!(h.governor.get_performance_metrics().active_backgrounds, 3);

        h.tick_with_fps(20.0);
        assert!(!h.governor.is_active("a"));
        assert!(h.governor.is_active("b"));
        assert!(h.governor.is_active("c"));
    }

    #[test]
    fn test_restore_picks_highest_priority() {
        let mut settings = Settings::default();
        settings.max_active_backgrounds = 1;
        let h = harness(settings);

        h.governor.register("d", RenderableKind::Canvas2d, 2, noop);
        h.governor.register("e", RenderableKind::Canvas2d, 7, noop);
        h.show("d");
        // d took the only slot; free it so restore has a choice.
        h.governor.update_settings(SettingsUpdate {
            reduced_motion_mode: Some(true),
            ..Default::default()
        });
        h.show("e");
        h.governor.update_settings(SettingsUpdate {
            reduced_motion_mode: Some(false),
            ..Default::default()
        });

        // Reconcile after re-enabling motion restores by priority.
        assert!(h.governor.is_active("e"));
        assert!(!h.governor.is_active("d"));
    }

    #[test]
    fn test_hysteresis_band_holds() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::GpuShader, 9, noop);
        assert!(h.governor.is_active("a"));

        // 85% of a 60fps target: inside the dead band.
        h.tick_with_fps(51.0);
        assert!(h.governor.is_active("a"));
        let stats = h.governor.scheduler_stats();
        assert_eq!(stats.degrade_passes, 0);
        assert_eq!(stats.restore_passes, 0);
    }

    #[test]
    fn test_memory_pressure_degrades() {
        struct FixedMemory(f64);
        impl MemoryProbe for FixedMemory {
            fn memory_usage_mb(&self) -> Option<f64> {
                Some(self.0)
            }
        }

        let clock = ManualClock::new();
        let governor = Governor::builder()
            .clock(Arc::new(clock.clone()))
            .memory_probe(Arc::new(FixedMemory(600.0)))
            .build();
        governor.register("a", RenderableKind::GpuShader, 10, noop);
        assert!(governor.is_active("a"));

        // Healthy fps, but 600MB > the 512MB threshold.
        for _ in 0..59 {
            governor.record_frame();
        }
        clock.advance(Duration::from_secs(1));
        governor.record_frame();
        assert!(!governor.is_active("a"));
    }

    #[test]
    fn test_quality_bounds_and_unknown_id() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::GpuShader, 9, noop);

        let q = h.governor.optimal_quality("a");
        assert!((0.3..=1.0).contains(&q));
        // Unknown ids get exactly 1.0, not the current pressure product.
        assert!((h.governor.optimal_quality("nope") - 1.0).abs() < f64::EPSILON);

        // Collapse the frame rate; quality drops but stays floored.
        h.tick_with_fps(10.0);
        let q = h.governor.optimal_quality("a");
        assert!((0.3..=1.0).contains(&q));
        assert!(q < 1.0);
    }

    #[test]
    fn test_frame_rate_scales_with_priority() {
        let h = harness(Settings::default());
        h.governor.register("low", RenderableKind::Canvas2d, 2, noop);
        h.governor.register("high", RenderableKind::Canvas2d, 9, noop);

        // priority 2 -> max(0.5, 0.2) -> half the 60fps target.
        assert_eq!(h.governor.optimal_frame_rate("low"), 30);
        assert_eq!(h.governor.optimal_frame_rate("high"), 54);
        assert!(h.governor.optimal_frame_rate("low") <= h.governor.optimal_frame_rate("high"));
        // Unknown ids get the unscaled target.
        assert_eq!(h.governor.optimal_frame_rate("nope"), 60);
    }

    #[test]
    fn test_reduced_motion_suppresses_everything() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::GpuShader, 10, noop);
        assert!(h.governor.is_active("a"));

        h.governor.update_settings(SettingsUpdate {
            reduced_motion_mode: Some(true),
            ..Default::default()
        });
        assert!(h.governor.should_use_reduced_motion());
        assert!(!h.governor.is_active("a"));

        // New high-priority registrations stay suppressed too.
        h.governor.register("b", RenderableKind::GpuShader, 10, noop);
        assert!(!h.governor.is_active("b"));
    }

    #[test]
    fn test_background_surface_deactivates_and_restores() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::GpuShader, 10, noop);
        assert!(h.governor.is_active("a"));

        h.governor.set_foreground(false);
        assert!(!h.governor.is_active("a"));

        h.governor.set_foreground(true);
        assert!(h.governor.is_active("a"));
    }

    #[test]
    fn test_lowering_cap_sheds_lowest_priority() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::Canvas2d, 4, noop);
        h.governor.register("b", RenderableKind::Canvas2d, 6, noop);
        h.show("a");
        h.show("b");
        assert_eq!(h.governor.get_performance_metrics().active_backgrounds, 2);

        h.governor.update_settings(SettingsUpdate {
            max_active_backgrounds: Some(1),
            ..Default::default()
        });
        assert!(!h.governor.is_active("a"));
        assert!(h.governor.is_active("b"));
    }

    #[test]
    fn test_invalid_settings_update_rejected() {
        let h = harness(Settings::default());
        h.governor.update_settings(SettingsUpdate {
            max_active_backgrounds: Some(0),
            ..Default::default()
        });
        assert_eq!(h.governor.settings().max_active_backgrounds, 2);
    }

    #[test]
    fn test_unregister_runs_cleanup_once() {
        let h = harness(Settings::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        h.governor.register("a", RenderableKind::Canvas2d, 5, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        h.governor.unregister("a");
        h.governor.unregister("a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!h.governor.is_active("a"));
    }

    #[test]
    fn test_cleanup_panic_does_not_poison_registry() {
        let h = harness(Settings::default());
        h.governor
            .register("bad", RenderableKind::Canvas2d, 5, || panic!("boom"));
        h.governor.register("good", RenderableKind::Canvas2d, 9, noop);

        h.governor.unregister("bad");
        assert_eq!(h.governor.scheduler_stats().cleanup_panics, 1);
        // The registry keeps serving the surviving instance.
        assert!(h.governor.is_active("good"));
    }

    #[test]
    fn test_shutdown_tears_down_remaining_instances() {
        let h = harness(Settings::default());
        let calls = Arc::new(AtomicUsize::new(0));
        for id in ["a", "b"] {
            let calls_clone = Arc::clone(&calls);
            h.governor.register(id, RenderableKind::Canvas2d, 5, move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });
        }

        h.governor.shutdown();
        h.governor.shutdown();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Post-shutdown registration is ignored.
        h.governor.register("c", RenderableKind::Canvas2d, 10, noop);
        assert!(!h.governor.is_active("c"));
        assert!(h.governor.instances().is_empty());
    }

    #[test]
    fn test_duplicate_registration_counted() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::Canvas2d, 5, noop);
        h.governor.register("a", RenderableKind::GpuShader, 9, noop);
        assert_eq!(h.governor.scheduler_stats().duplicate_registrations, 1);
        let info = &h.governor.instances()[0];
        assert_eq!(info.kind, RenderableKind::Canvas2d);
        assert_eq!(info.priority, 5);
    }

    #[test]
    fn test_render_time_is_observability_only() {
        let h = harness(Settings::default());
        h.governor.register("a", RenderableKind::GpuShader, 10, noop);
        let active_before = h.governor.is_active("a");

        h.governor.update_render_time("a", 12.5);
        h.governor.update_render_time("nope", 99.0);

        assert_eq!(h.governor.is_active("a"), active_before);
        let metrics = h.governor.get_performance_metrics();
        assert!((metrics.render_time_ms - 12.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_device_probe_applies_once() {
        let clock = ManualClock::new();
        let governor = Governor::builder()
            .clock(Arc::new(clock))
            .gpu_probe(Arc::new(StaticGpuTierProbe::new(1)))
            .build();

        governor.run_device_probe().await;
        assert_eq!(governor.settings().max_active_backgrounds, 1);
        assert_eq!(governor.settings().target_fps, 30);

        // A second application is ignored.
        governor.apply_gpu_tier(3);
        assert_eq!(governor.settings().target_fps, 30);
    }
}
