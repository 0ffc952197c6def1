//! Metrics snapshots and scheduler statistics
//!
//! Metrics are ephemeral: each snapshot reflects only the most recent
//! sample, and no history is retained. Consumers that want trends must
//! poll repeatedly. [`SchedulerStats`] are cumulative counters in the
//! style of frame-pipeline statistics, for operational visibility.

use serde::{Deserialize, Serialize};

/// Point-in-time view of the sampled performance signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Frames per second over the last closed sampling window.
    pub fps: f64,
    /// Last polled heap usage in MiB (0 when no memory source exists).
    pub memory_usage_mb: f64,
    /// Last externally reported render duration in milliseconds.
    pub render_time_ms: f64,
    /// Number of instances currently permitted to render.
    pub active_backgrounds: usize,
}

impl MetricsSnapshot {
    /// Export the snapshot as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Cumulative scheduling counters since construction (or the last reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Single-instance eligibility evaluations performed.
    pub evaluations: u64,
    /// Instances flipped to active.
    pub activations: u64,
    /// Instances flipped to inactive.
    pub deactivations: u64,
    /// Periodic passes that took the degrade branch.
    pub degrade_passes: u64,
    /// Periodic passes that took the restore branch.
    pub restore_passes: u64,
    /// Register calls rejected as duplicates.
    pub duplicate_registrations: u64,
    /// Cleanup callbacks that panicked during teardown.
    pub cleanup_panics: u64,
}

/// Mutable metric state owned by the governor.
pub(crate) struct MetricsState {
    pub(crate) fps: f64,
    pub(crate) memory_usage_mb: f64,
    pub(crate) render_time_ms: f64,
}

impl MetricsState {
    /// Start neutral: fps assumes the target until the first window
    /// closes, so an unmeasured startup never reads as pressure.
    pub(crate) fn new(target_fps: f64) -> Self {
        Self {
            fps: target_fps,
            memory_usage_mb: 0.0,
            render_time_ms: 0.0,
        }
    }

    /// Re-neutralize fps after the target itself changed (device tier
    /// application rewrites the target mid-flight).
    pub(crate) fn reset_fps(&mut self, target_fps: f64) {
        self.fps = target_fps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_export() {
        let snapshot = MetricsSnapshot {
            fps: 58.5,
            memory_usage_mb: 120.0,
            render_time_ms: 4.2,
            active_backgrounds: 2,
        };
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"fps\""));
        assert!(json.contains("\"active_backgrounds\": 2"));
    }

    #[test]
    fn test_metrics_state_starts_neutral() {
        let state = MetricsState::new(60.0);
        assert!((state.fps - 60.0).abs() < f64::EPSILON);
        assert_eq!(state.memory_usage_mb, 0.0);
        assert_eq!(state.render_time_ms, 0.0);
    }
}
