//! Viewport visibility tracking
//!
//! One watch per registered instance, attached at registration and
//! disconnected at unregister. Transitions arrive as mailbox events and
//! are edge-triggered: the governor re-evaluates the affected instance as
//! soon as the event is pumped, without waiting for the periodic tick.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::VisibilityConfig;
use crate::events::Mailbox;
use crate::platform::{VisibilityProvider, VisibilityWatch};

/// Per-instance watch bookkeeping over a [`VisibilityProvider`].
pub(crate) struct VisibilityTracker {
    provider: Arc<dyn VisibilityProvider>,
    config: VisibilityConfig,
    watches: HashMap<String, Box<dyn VisibilityWatch>>,
}

impl VisibilityTracker {
    pub(crate) fn new(provider: Arc<dyn VisibilityProvider>, config: VisibilityConfig) -> Self {
        Self {
            provider,
            config,
            watches: HashMap::new(),
        }
    }

    /// Attach a watch for `id`. Returns whether a platform observer
    /// exists; `false` means the host is headless and the instance will
    /// rely on priority bootstrapping alone. Idempotent per id.
    pub(crate) fn watch(&mut self, id: &str, mailbox: &Mailbox) -> bool {
        if self.watches.contains_key(id) {
            return true;
        }
        match self.provider.watch(id, &self.config, mailbox.clone()) {
            Some(watch) => {
                self.watches.insert(id.to_string(), watch);
                true
            }
            None => {
                debug!("no visibility observer for '{}'; priority bootstrapping only", id);
                false
            }
        }
    }

    /// Disconnect the watch for `id`, if any. Safe to call repeatedly.
    pub(crate) fn unwatch(&mut self, id: &str) {
        if let Some(mut watch) = self.watches.remove(id) {
            watch.disconnect();
        }
    }

    pub(crate) fn unwatch_all(&mut self) {
        for (_, mut watch) in self.watches.drain() {
            watch.disconnect();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_watched(&self, id: &str) -> bool {
        self.watches.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::platform::{ManualVisibilityProvider, NullVisibilityProvider};

    #[test]
    fn test_watch_and_unwatch() {
        let provider = ManualVisibilityProvider::new();
        let mut tracker = VisibilityTracker::new(
            Arc::new(provider.clone()),
            VisibilityConfig::default(),
        );
        let (mailbox, rx) = events::channel();

        assert!(tracker.watch("a", &mailbox));
        assert!(tracker.is_watched("a"));
        assert!(provider.set_visible("a", true));
        assert!(rx.try_recv().is_ok());

        tracker.unwatch("a");
        assert!(!tracker.is_watched("a"));
        // Disconnected watches deliver nothing further.
        assert!(!provider.set_visible("a", false));
        tracker.unwatch("a");
    }

    #[test]
    fn test_watch_is_idempotent() {
        let provider = ManualVisibilityProvider::new();
        let mut tracker = VisibilityTracker::new(
            Arc::new(provider.clone()),
            VisibilityConfig::default(),
        );
        let (mailbox, _rx) = events::channel();

        assert!(tracker.watch("a", &mailbox));
        assert!(tracker.watch("a", &mailbox));
    }

    #[test]
    fn test_headless_watch_returns_false() {
        let mut tracker = VisibilityTracker::new(
            Arc::new(NullVisibilityProvider),
            VisibilityConfig::default(),
        );
        let (mailbox, _rx) = events::channel();

        assert!(!tracker.watch("a", &mailbox));
        assert!(!tracker.is_watched("a"));
    }

    #[test]
    fn test_unwatch_all_disconnects() {
        let provider = ManualVisibilityProvider::new();
        let mut tracker = VisibilityTracker::new(
            Arc::new(provider.clone()),
            VisibilityConfig::default(),
        );
        let (mailbox, _rx) = events::channel();

        tracker.watch("a", &mailbox);
        tracker.watch("b", &mailbox);
        tracker.unwatch_all();
        assert!(!provider.is_watched("a"));
        assert!(!provider.is_watched("b"));
    }
}
