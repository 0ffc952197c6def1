//! Device capability probing
//!
//! One-shot, asynchronous estimation of the device rendering tier at
//! governor start-up. A failing detector falls back to a pixel-ratio
//! heuristic; the resulting tier rewrites the concurrency cap and
//! frame-rate target at most once per governor lifetime. Mid-range
//! devices leave the configured defaults untouched.

use tracing::debug;

use crate::config::Settings;
use crate::platform::GpuTierProbe;

/// Tier assumed until probing resolves. Mid-range: no settings rewrite
/// and a neutral quality multiplier.
pub const DEFAULT_GPU_TIER: u8 = 2;

/// Pixel-ratio heuristic used when tier detection fails: high-density
/// displays usually pair with at least mid-range GPUs.
pub fn fallback_tier(device_pixel_ratio: f64) -> u8 {
    if device_pixel_ratio > 1.0 {
        2
    } else {
        1
    }
}

/// Run the detector and clamp its answer to the valid 1..=4 range,
/// falling back to [`fallback_tier`] on failure. Never errors.
pub async fn resolve_tier(probe: &dyn GpuTierProbe) -> u8 {
    match probe.detect_tier().await {
        Ok(tier) => tier.clamp(1, 4),
        Err(err) => {
            let tier = fallback_tier(probe.device_pixel_ratio());
            debug!(
                "gpu tier detection failed ({:#}); pixel-ratio heuristic gives tier {}",
                err, tier
            );
            tier
        }
    }
}

/// Rewrite settings for the resolved tier. Returns whether anything
/// changed (tier 2 leaves defaults untouched).
pub fn apply_tier(settings: &mut Settings, tier: u8) -> bool {
    match tier {
        0 | 1 => {
            settings.max_active_backgrounds = 1;
            settings.target_fps = 30;
            true
        }
        3.. => {
            settings.max_active_backgrounds = 3;
            settings.target_fps = 90;
            true
        }
        _ => false,
    }
}
