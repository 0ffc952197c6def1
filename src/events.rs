//! Governor event channel
//!
//! Asynchronous sources (visibility observers, foreground tracking) never
//! touch governor state directly. They post [`GovernorEvent`]s into a
//! mailbox that the owning host drains through `Governor::process_events`
//! or the async `Governor::run` loop, so edge-triggered and periodic
//! evaluation share one serialized path and can be tested without real
//! timers or platform observers.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// An event addressed to the governor's evaluation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernorEvent {
    /// A visibility observer reported an intersection transition for `id`.
    VisibilityChanged {
        /// Registry key of the affected instance.
        id: String,
        /// Whether the instance now intersects the viewport.
        visible: bool,
    },
    /// The hosting surface moved between foreground and background.
    ForegroundChanged(bool),
}

/// Cloneable sending half of the governor's event channel.
///
/// Posting never blocks and never fails visibly; events sent after the
/// governor is dropped are discarded.
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: Sender<GovernorEvent>,
}

impl Mailbox {
    /// Post an event for the next evaluation pass.
    pub fn post(&self, event: GovernorEvent) {
        let _ = self.tx.send(event);
    }

    /// Convenience for the most common event.
    pub fn visibility_changed(&self, id: &str, visible: bool) {
        self.post(GovernorEvent::VisibilityChanged {
            id: id.to_string(),
            visible,
        });
    }

    /// Report a foreground/background transition of the hosting surface.
    pub fn foreground_changed(&self, foreground: bool) {
        self.post(GovernorEvent::ForegroundChanged(foreground));
    }
}

pub(crate) fn channel() -> (Mailbox, Receiver<GovernorEvent>) {
    let (tx, rx) = unbounded();
    (Mailbox { tx }, rx)
}
