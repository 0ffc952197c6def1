//! Performance sampling
//!
//! Three independent, individually optional measurement sources feed the
//! governor's metrics:
//!
//! - a rolling frame-rate window driven by the animation-frame clock
//! - a slower-cadence heap-memory poll
//! - externally reported render durations (pass-through, see
//!   `Governor::update_render_time`)
//!
//! A missing source degrades to its neutral value: fps holds the previous
//! measurement, memory stays zero, render time stays zero. Closing the
//! frame window is what fires the periodic scheduling pass.

use std::time::Duration;

use crate::config::SamplerConfig;

/// Rolling frame counter and memory-poll cadence bookkeeping.
pub(crate) struct PerformanceSampler {
    fps_window: Duration,
    memory_interval: Duration,
    window_start: Duration,
    frames_in_window: u32,
    last_memory_poll: Option<Duration>,
}

impl PerformanceSampler {
    pub(crate) fn new(config: &SamplerConfig, now: Duration) -> Self {
        Self {
            fps_window: Duration::from_millis(config.fps_window_ms),
            memory_interval: Duration::from_millis(config.memory_poll_interval_ms),
            window_start: now,
            frames_in_window: 0,
            last_memory_poll: None,
        }
    }

    /// Count one animation frame. Returns the measured rate when the
    /// window closes, which is the trigger for a periodic pass.
    pub(crate) fn record_frame(&mut self, now: Duration) -> Option<f64> {
        self.frames_in_window += 1;
        let elapsed = now.saturating_sub(self.window_start);
        if elapsed < self.fps_window {
            return None;
        }
        let fps = f64::from(self.frames_in_window) / elapsed.as_secs_f64();
        self.window_start = now;
        self.frames_in_window = 0;
        Some(fps)
    }

    /// Whether the memory indicator should be polled now. The first call
    /// always polls so metrics carry a value early.
    pub(crate) fn memory_poll_due(&mut self, now: Duration) -> bool {
        let due = match self.last_memory_poll {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.memory_interval,
        };
        if due {
            self.last_memory_poll = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> PerformanceSampler {
        PerformanceSampler::new(&SamplerConfig::default(), Duration::ZERO)
    }

    #[test]
    fn test_fps_window_closes_after_one_second() {
        let mut s = sampler();
        for i in 1..=59 {
            assert!(s.record_frame(Duration::from_millis(i * 16)).is_none());
        }
        let fps = s.record_frame(Duration::from_millis(1008)).unwrap();
        // 60 frames over 1.008s
        assert!((fps - 59.5).abs() < 1.0, "fps = {fps}");
    }

    #[test]
    fn test_window_resets_after_measurement() {
        let mut s = sampler();
        s.record_frame(Duration::from_millis(500));
        assert!(s.record_frame(Duration::from_secs(1)).is_some());
        // Fresh window: a frame right after the close does not re-trigger.
        assert!(s.record_frame(Duration::from_millis(1016)).is_none());
    }

    #[test]
    fn test_slow_host_measures_low_fps() {
        let mut s = sampler();
        s.record_frame(Duration::from_secs(1));
        let fps = s.record_frame(Duration::from_secs(2)).unwrap();
        assert!(fps < 2.0, "fps = {fps}");
    }

    #[test]
    fn test_memory_poll_cadence() {
        let mut s = sampler();
        assert!(s.memory_poll_due(Duration::ZERO));
        assert!(!s.memory_poll_due(Duration::from_secs(2)));
        assert!(!s.memory_poll_due(Duration::from_millis(4999)));
        assert!(s.memory_poll_due(Duration::from_secs(5)));
        assert!(!s.memory_poll_due(Duration::from_secs(6)));
        assert!(s.memory_poll_due(Duration::from_secs(10)));
    }
}
