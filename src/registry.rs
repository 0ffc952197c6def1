//! Instance registry
//!
//! Source of truth for every registered renderable. The registry owns all
//! entries outright; the renderable keeps only its id and the obligation
//! to unregister. Two writers exist: the visibility tracker (sole writer
//! of `is_visible`) and the admission controller (sole writer of
//! `is_active`).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Instances registered at or above this priority are admitted immediately
/// at registration, before any visibility signal arrives. Bootstraps
/// above-the-fold effects and headless hosts with no visibility source.
pub const AUTO_ACTIVATE_PRIORITY: i32 = 8;

/// Type tag for a registered renderable. Informational only; admission
/// decisions never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderableKind {
    /// WebGL/WGPU-style shader surface.
    #[serde(rename = "gpu-shader")]
    GpuShader,
    /// Software 2D canvas effect.
    #[serde(rename = "2d-canvas")]
    Canvas2d,
    /// Pure CSS/compositor animation.
    #[serde(rename = "css-only")]
    CssOnly,
}

pub(crate) type CleanupFn = Box<dyn FnOnce() + Send + 'static>;

/// One registered renderable.
pub(crate) struct RenderableInstance {
    pub(crate) id: String,
    pub(crate) kind: RenderableKind,
    pub(crate) priority: i32,
    /// Registration sequence, the stable tie-break.
    pub(crate) seq: u64,
    pub(crate) is_visible: bool,
    pub(crate) is_active: bool,
    /// Set once the first real visibility signal lands for this id.
    /// Until then, high-priority instances count as effectively visible.
    pub(crate) saw_visibility: bool,
    /// Whether a platform observer is attached (false in headless hosts).
    pub(crate) has_observer: bool,
    pub(crate) last_render_time_ms: f64,
    // Mutex keeps the entry Sync despite the boxed FnOnce.
    cleanup: Mutex<Option<CleanupFn>>,
}

impl RenderableInstance {
    pub(crate) fn take_cleanup(&self) -> Option<CleanupFn> {
        self.cleanup.lock().take()
    }
}

/// Read-only view of a registered instance, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    /// Registry key.
    pub id: String,
    /// Type tag supplied at registration.
    pub kind: RenderableKind,
    /// Caller-supplied priority.
    pub priority: i32,
    /// Last viewport intersection state.
    pub is_visible: bool,
    /// Whether the governor currently permits rendering.
    pub is_active: bool,
    /// Whether a platform visibility observer is attached.
    pub observed: bool,
    /// Last self-reported render duration in milliseconds.
    pub last_render_time_ms: f64,
}

/// Keyed collection of [`RenderableInstance`] entries.
#[derive(Default)]
pub(crate) struct InstanceRegistry {
    entries: HashMap<String, RenderableInstance>,
    next_seq: u64,
}

impl InstanceRegistry {
    /// Insert a new entry. Duplicate ids are a warned no-op, never an
    /// error, and leave the existing entry untouched.
    pub(crate) fn insert(
        &mut self,
        id: &str,
        kind: RenderableKind,
        priority: i32,
        cleanup: CleanupFn,
    ) -> bool {
        if self.entries.contains_key(id) {
            warn!("duplicate registration for '{}' ignored", id);
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id.to_string(),
            RenderableInstance {
                id: id.to_string(),
                kind,
                priority,
                seq,
                is_visible: false,
                is_active: false,
                saw_visibility: false,
                has_observer: false,
                last_render_time_ms: 0.0,
                cleanup: Mutex::new(Some(cleanup)),
            },
        );
        true
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<RenderableInstance> {
        self.entries.remove(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&RenderableInstance> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut RenderableInstance> {
        self.entries.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_active).count()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RenderableInstance> {
        self.entries.values()
    }

    /// Remove and return every entry, for shutdown teardown.
    pub(crate) fn drain(&mut self) -> Vec<RenderableInstance> {
        self.entries.drain().map(|(_, e)| e).collect()
    }
}

/// Invoke a cleanup callback, isolating panics so one misbehaving effect
/// cannot abort registry bookkeeping. Returns `true` if it panicked.
pub(crate) fn run_cleanup(id: &str, cleanup: CleanupFn) -> bool {
    let panicked =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || cleanup())).is_err();
    if panicked {
        warn!("cleanup callback for '{}' panicked; entry already detached", id);
    }
    panicked
}
