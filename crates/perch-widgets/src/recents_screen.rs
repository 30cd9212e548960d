#![forbid(unsafe_code)]

//! Recents screen state.
//!
//! A scrollable row of snapshots of running apps. The widget consumes the
//! manager's running list and snapshot buffers; dismissing a snapshot posts
//! a stop request. Snapshot imagery comes from
//! [`Manager::snapshot`](perch_runtime::Manager::snapshot).

use perch_core::geometry::Size;
use perch_runtime::{AppId, SystemEvent, SystemEventQueue};
use tracing::debug;

/// One recents card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentsSnapshot {
    /// The running app this card shows.
    pub id: AppId,
    /// Dimensions of the snapshot image.
    pub size: Size,
}

/// The recents screen.
#[derive(Debug)]
pub struct RecentsScreen {
    queue: SystemEventQueue,
    visible: bool,
    snapshots: Vec<RecentsSnapshot>,
    focus: usize,
    memory_label: String,
}

impl RecentsScreen {
    /// Create a recents screen posting into the given queue.
    pub fn new(queue: SystemEventQueue) -> Self {
        Self {
            queue,
            visible: false,
            snapshots: Vec::new(),
            focus: 0,
            memory_label: String::new(),
        }
    }

    /// Show or hide the overview.
    pub fn set_visible(&mut self, visible: bool) {
        debug!(visible, "recents visibility");
        self.visible = visible;
    }

    /// Whether the overview is shown.
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Add a card for a running app. Re-adding updates the size.
    pub fn add_snapshot(&mut self, id: AppId, size: Size) {
        if let Some(existing) = self.snapshots.iter_mut().find(|s| s.id == id) {
            existing.size = size;
            return;
        }
        self.snapshots.push(RecentsSnapshot { id, size });
    }

    /// Remove a card without stopping the app (it closed on its own).
    pub fn remove_snapshot(&mut self, id: AppId) -> bool {
        let before = self.snapshots.len();
        self.snapshots.retain(|s| s.id != id);
        let removed = self.snapshots.len() != before;
        if removed {
            self.focus = self.focus.min(self.snapshots.len().saturating_sub(1));
        }
        removed
    }

    /// The user dismissed a card: remove it and post a stop request.
    pub fn dismiss(&mut self, id: AppId) -> bool {
        if !self.remove_snapshot(id) {
            return false;
        }
        debug!(app_id = %id, "recents dismissal");
        self.queue.post(SystemEvent::AppStop(id));
        true
    }

    /// Whether a card exists for the app.
    pub fn has_snapshot(&self, id: AppId) -> bool {
        self.snapshots.iter().any(|s| s.id == id)
    }

    /// All cards in insertion order.
    pub fn snapshots(&self) -> &[RecentsSnapshot] {
        &self.snapshots
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether there are no cards.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Scroll so the card for the app is focused.
    pub fn scroll_to(&mut self, id: AppId) -> bool {
        match self.snapshots.iter().position(|s| s.id == id) {
            Some(index) => {
                self.focus = index;
                true
            }
            None => false,
        }
    }

    /// The focused card, if any.
    pub fn focused(&self) -> Option<&RecentsSnapshot> {
        self.snapshots.get(self.focus)
    }

    /// Update the free-memory label text.
    pub fn set_memory_label(
        &mut self,
        internal_free_kb: u32,
        internal_total_kb: u32,
        external_free_kb: u32,
        external_total_kb: u32,
    ) {
        self.memory_label = format!(
            "RAM {internal_free_kb}/{internal_total_kb} KB  PSRAM {external_free_kb}/{external_total_kb} KB"
        );
    }

    /// The free-memory label text.
    pub fn memory_label(&self) -> &str {
        &self.memory_label
    }
}
