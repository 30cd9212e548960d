#![forbid(unsafe_code)]

//! App launcher state.
//!
//! A paged table of installed-app icons. Activating an icon posts a start
//! request; the manager handles admission from there. Icon imagery and grid
//! geometry are the host's concern.

use std::fmt;

use perch_runtime::{AppId, SystemEvent, SystemEventQueue};
use tracing::debug;

/// One launcher entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherIcon {
    /// The installed app this icon starts.
    pub id: AppId,
    /// Label under the icon.
    pub name: String,
}

/// Launcher error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherError {
    /// An icon for this app already exists.
    Duplicate(AppId),
    /// No icon for this app.
    Unknown(AppId),
}

impl fmt::Display for LauncherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LauncherError::Duplicate(id) => write!(f, "icon for app {id} already exists"),
            LauncherError::Unknown(id) => write!(f, "no icon for app {id}"),
        }
    }
}

impl std::error::Error for LauncherError {}

/// The app launcher.
#[derive(Debug)]
pub struct AppLauncher {
    queue: SystemEventQueue,
    icons: Vec<LauncherIcon>,
    icons_per_page: usize,
}

impl AppLauncher {
    /// Create a launcher posting into the given queue.
    pub fn new(queue: SystemEventQueue, icons_per_page: usize) -> Self {
        Self {
            queue,
            icons: Vec::new(),
            icons_per_page: icons_per_page.max(1),
        }
    }

    /// Add an icon for an installed app.
    pub fn add_icon(&mut self, id: AppId, name: impl Into<String>) -> Result<(), LauncherError> {
        if self.has_icon(id) {
            return Err(LauncherError::Duplicate(id));
        }
        let name = name.into();
        debug!(app_id = %id, name = %name, "launcher icon added");
        self.icons.push(LauncherIcon { id, name });
        Ok(())
    }

    /// Remove the icon for an app.
    pub fn remove_icon(&mut self, id: AppId) -> Result<(), LauncherError> {
        let before = self.icons.len();
        self.icons.retain(|icon| icon.id != id);
        if self.icons.len() == before {
            return Err(LauncherError::Unknown(id));
        }
        debug!(app_id = %id, "launcher icon removed");
        Ok(())
    }

    /// Whether an icon exists for the app.
    pub fn has_icon(&self, id: AppId) -> bool {
        self.icons.iter().any(|icon| icon.id == id)
    }

    /// All icons in insertion order.
    pub fn icons(&self) -> &[LauncherIcon] {
        &self.icons
    }

    /// Number of icons.
    pub fn icon_count(&self) -> usize {
        self.icons.len()
    }

    /// Number of pages at the configured page size.
    pub fn page_count(&self) -> usize {
        self.icons.len().div_ceil(self.icons_per_page).max(1)
    }

    /// Icons on the given page.
    pub fn page(&self, index: usize) -> &[LauncherIcon] {
        let start = index * self.icons_per_page;
        if start >= self.icons.len() {
            return &[];
        }
        let end = (start + self.icons_per_page).min(self.icons.len());
        &self.icons[start..end]
    }

    /// An icon was activated; post the start request.
    pub fn activate(&self, id: AppId) -> Result<(), LauncherError> {
        if !self.has_icon(id) {
            return Err(LauncherError::Unknown(id));
        }
        debug!(app_id = %id, "launcher icon activated");
        self.queue.post(SystemEvent::AppStart(id));
        Ok(())
    }
}
