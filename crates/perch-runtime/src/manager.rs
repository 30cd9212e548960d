#![forbid(unsafe_code)]

//! Installed/running app bookkeeping and admission control.
//!
//! The manager owns the per-app entries, assigns ids, enforces the
//! running-app limit (evicting the single oldest running app by start
//! order), routes navigation, and completes deferred cleanups when the
//! kernel reports the awaited screen unloaded.
//!
//! Eviction is deliberately not LRU: only insertion order counts, and only
//! one app is evicted per admission.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use perch_gfx::{ScreenHandle, SnapshotBuf};
use tracing::{debug, error, warn};

use crate::app::{App, AppId, Status};
use crate::context::{Context, NavigateKind};
use crate::display::{Display, DisplayError};
use crate::lifecycle::{AppEntry, LifecycleError};

use bitflags::bitflags;

bitflags! {
    /// Manager capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ManagerFlags: u8 {
        /// Render a paused app's screen into an off-screen buffer for the
        /// recents screen.
        const SAVE_SNAPSHOT = 1;
    }
}

/// Manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManagerData {
    /// Maximum number of concurrently running apps; 0 means unlimited.
    pub max_running: usize,
    /// Capability flags.
    pub flags: ManagerFlags,
}

impl Default for ManagerData {
    fn default() -> Self {
        Self {
            max_running: 3,
            flags: ManagerFlags::empty(),
        }
    }
}

/// Manager error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// The app value is already installed.
    AlreadyInstalled,
    /// No installed app has this id.
    NotInstalled(AppId),
    /// The app is installed but not running.
    NotRunning(AppId),
    /// A lifecycle transition failed.
    Lifecycle(LifecycleError),
    /// A display operation failed.
    Display(DisplayError),
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::AlreadyInstalled => write!(f, "app is already installed"),
            ManagerError::NotInstalled(id) => write!(f, "app {id} is not installed"),
            ManagerError::NotRunning(id) => write!(f, "app {id} is not running"),
            ManagerError::Lifecycle(e) => write!(f, "lifecycle failed: {e}"),
            ManagerError::Display(e) => write!(f, "display failed: {e}"),
        }
    }
}

impl std::error::Error for ManagerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManagerError::Lifecycle(e) => Some(e),
            ManagerError::Display(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LifecycleError> for ManagerError {
    fn from(e: LifecycleError) -> Self {
        ManagerError::Lifecycle(e)
    }
}

impl From<DisplayError> for ManagerError {
    fn from(e: DisplayError) -> Self {
        ManagerError::Display(e)
    }
}

/// The app manager.
pub struct Manager {
    data: ManagerData,
    installed: BTreeMap<u32, AppEntry>,
    /// Running apps in start order; the front is the eviction candidate.
    running: Vec<AppId>,
    active: Option<AppId>,
    next_id: u32,
    snapshots: HashMap<u32, SnapshotBuf>,
    /// Deferred cleanups waiting for a screen-unloaded report.
    pending_cleanups: Vec<(ScreenHandle, AppId)>,
}

impl Manager {
    /// Create a manager from its configuration.
    pub fn new(data: ManagerData) -> Self {
        Self {
            data,
            installed: BTreeMap::new(),
            running: Vec::new(),
            active: None,
            next_id: AppId::MIN.0,
            snapshots: HashMap::new(),
            pending_cleanups: Vec::new(),
        }
    }

    // --- Install / uninstall ---

    /// Install an app, assigning it a fresh id.
    ///
    /// All-or-nothing: a failure in any step unwinds the ones before it and
    /// no id is consumed.
    pub fn install_app(
        &mut self,
        ctx: &Context,
        display: &Display,
        app: Rc<std::cell::RefCell<dyn App>>,
    ) -> Result<AppId, ManagerError> {
        if self.installed.values().any(|e| e.same_app(&app)) {
            return Err(ManagerError::AlreadyInstalled);
        }

        let id = AppId(self.next_id);
        let mut entry = AppEntry::new(app);
        entry.process_install(ctx, id)?;

        entry.set_visual_area(display.app_visual_area(ctx));
        entry.calibrate_visual_area();

        if let Err(e) = display.process_app_install(ctx, id) {
            error!(app_id = %id, %e, "display rejected install, rolling back");
            entry.process_uninstall(ctx);
            return Err(e.into());
        }

        debug!(app = entry.name(), app_id = %id, "installed");
        self.installed.insert(id.0, entry);
        self.next_id += 1;
        Ok(id)
    }

    /// Uninstall an app, removing it from every map.
    ///
    /// Teardown is best-effort: individual step failures are logged, the
    /// bookkeeping is cleaned regardless.
    pub fn uninstall_app(
        &mut self,
        ctx: &Context,
        display: &Display,
        id: AppId,
    ) -> Result<(), ManagerError> {
        if !self.installed.contains_key(&id.0) {
            return Err(ManagerError::NotInstalled(id));
        }
        if let Err(e) = display.process_app_uninstall(ctx, id) {
            error!(app_id = %id, %e, "display uninstall failed");
        }
        if let Some(entry) = self.installed.get_mut(&id.0) {
            entry.process_uninstall(ctx);
        }
        self.installed.remove(&id.0);
        self.running.retain(|&r| r != id);
        if self.active == Some(id) {
            self.active = None;
        }
        self.snapshots.remove(&id.0);
        self.pending_cleanups.retain(|&(_, a)| a != id);
        debug!(app_id = %id, "uninstalled");
        Ok(())
    }

    // --- Start / stop ---

    /// Start an app: a fresh run when closed, a resume when already running.
    ///
    /// When the running count is at the configured limit the single oldest
    /// running app (by start order) is force-closed first.
    pub fn start_app(
        &mut self,
        ctx: &Context,
        display: &Display,
        id: AppId,
    ) -> Result<(), ManagerError> {
        if self.running.contains(&id) {
            debug!(app_id = %id, "already running, resuming");
            return self.resume_app(ctx, display, id);
        }
        if !self.installed.contains_key(&id.0) {
            return Err(ManagerError::NotInstalled(id));
        }

        if self.data.max_running > 0 && self.running.len() >= self.data.max_running {
            let oldest = self.running[0];
            warn!(
                running = self.running.len(),
                evicting = %oldest,
                "running-app limit reached, closing oldest"
            );
            self.close_app(ctx, display, oldest)?;
        }

        let entry = self
            .installed
            .get_mut(&id.0)
            .ok_or(ManagerError::NotInstalled(id))?;
        let result = entry.process_run(ctx);
        self.collect_deferred(id);

        match result {
            Ok(()) => {
                self.running.push(id);
                self.active = Some(id);
                Ok(())
            }
            Err(e) => {
                // The entry force-closed itself; bring the home view back.
                if let Err(de) = display.process_app_close(ctx, true) {
                    error!(app_id = %id, %de, "main screen restore failed");
                }
                Err(e.into())
            }
        }
    }

    /// Close a running app.
    pub fn close_app(
        &mut self,
        ctx: &Context,
        display: &Display,
        id: AppId,
    ) -> Result<(), ManagerError> {
        if !self.running.contains(&id) {
            return Err(ManagerError::NotRunning(id));
        }
        let was_active = self.active == Some(id);
        let entry = self
            .installed
            .get_mut(&id.0)
            .ok_or(ManagerError::NotInstalled(id))?;
        entry.process_close(ctx, was_active);
        self.collect_deferred(id);
        self.snapshots.remove(&id.0);

        if let Err(e) = display.process_app_close(ctx, was_active) {
            error!(app_id = %id, %e, "display close failed");
        }
        self.running.retain(|&r| r != id);
        if was_active {
            self.active = None;
        }
        debug!(app_id = %id, "closed");
        Ok(())
    }

    fn resume_app(
        &mut self,
        ctx: &Context,
        display: &Display,
        id: AppId,
    ) -> Result<(), ManagerError> {
        if let Some(active_id) = self.active
            && active_id != id
            && self.running.contains(&active_id)
        {
            self.pause_app(ctx, display, active_id)?;
        }

        let entry = self
            .installed
            .get_mut(&id.0)
            .ok_or(ManagerError::NotInstalled(id))?;
        let result = entry.process_resume(ctx);
        let closed = entry.status() == Status::Closed;
        self.collect_deferred(id);

        match result {
            Ok(()) => {
                self.active = Some(id);
                Ok(())
            }
            Err(e) => {
                if closed {
                    self.reap_closed(ctx, display, id);
                }
                Err(e.into())
            }
        }
    }

    /// Pause a running app, snapshotting it when the capability is on.
    pub fn pause_app(
        &mut self,
        ctx: &Context,
        display: &Display,
        id: AppId,
    ) -> Result<(), ManagerError> {
        let entry = self
            .installed
            .get_mut(&id.0)
            .ok_or(ManagerError::NotInstalled(id))?;
        let result = entry.process_pause(ctx);
        let closed = entry.status() == Status::Closed;
        self.collect_deferred(id);

        match result {
            Ok(()) => {
                if self.data.flags.contains(ManagerFlags::SAVE_SNAPSHOT)
                    && let Err(e) = self.save_snapshot(ctx, id)
                {
                    error!(app_id = %id, %e, "snapshot save failed");
                }
                Ok(())
            }
            Err(e) => {
                if closed {
                    self.reap_closed(ctx, display, id);
                }
                Err(e.into())
            }
        }
    }

    /// Route a navigation request.
    pub fn navigate(
        &mut self,
        ctx: &Context,
        display: &Display,
        kind: NavigateKind,
    ) -> Result<(), ManagerError> {
        debug!(?kind, "navigate");
        match kind {
            NavigateKind::Back => {
                if let Some(id) = self.active
                    && let Some(entry) = self.installed.get_mut(&id.0)
                    && let Err(e) = entry.process_back(ctx)
                {
                    error!(app_id = %id, %e, "back hook failed");
                }
                Ok(())
            }
            NavigateKind::Home => {
                if let Some(id) = self.active
                    && self.status_of(id) == Some(Status::Running)
                {
                    self.pause_app(ctx, display, id)?;
                }
                display.load_main_screen(ctx)?;
                Ok(())
            }
            // The recents view belongs to the shell layer; it consumes the
            // running list and snapshots through the accessors.
            NavigateKind::Recents => Ok(()),
        }
    }

    // --- Kernel event completions ---

    /// The kernel reported a screen unloaded; complete any deferred cleanup
    /// waiting on it.
    pub fn complete_unload(&mut self, ctx: &Context, screen: ScreenHandle) {
        let mut index = 0;
        while index < self.pending_cleanups.len() {
            if self.pending_cleanups[index].0 == screen {
                let (_, id) = self.pending_cleanups.remove(index);
                debug!(app_id = %id, ?screen, "completing deferred cleanup");
                if let Some(entry) = self.installed.get_mut(&id.0) {
                    entry.finish_deferred_cleanup(ctx);
                }
            } else {
                index += 1;
            }
        }
    }

    /// The kernel reported a screen loaded; reposition it if a running app
    /// tracks it inside a shrunk visual area.
    pub fn on_screen_loaded(&self, ctx: &Context, screen: ScreenHandle) {
        for entry in self.installed.values() {
            entry.on_screen_loaded(ctx, screen);
        }
    }

    // --- Snapshots ---

    fn save_snapshot(&mut self, ctx: &Context, id: AppId) -> Result<(), ManagerError> {
        let entry = self
            .installed
            .get(&id.0)
            .ok_or(ManagerError::NotInstalled(id))?;
        let Some(screen) = entry.active_screen() else {
            return Err(LifecycleError::NoAppScreen.into());
        };
        let dims = ctx.display_size();
        // Reuse the previous buffer when the dimensions still match.
        let mut buf = match self.snapshots.remove(&id.0) {
            Some(buf) if buf.matches(dims) => buf,
            _ => SnapshotBuf::new(dims),
        };
        ctx.device()
            .snapshot_screen(screen, &mut buf)
            .map_err(LifecycleError::from)?;
        self.snapshots.insert(id.0, buf);
        Ok(())
    }

    /// A paused app's snapshot, when one was taken.
    pub fn snapshot(&self, id: AppId) -> Option<&SnapshotBuf> {
        self.snapshots.get(&id.0)
    }

    // --- Accessors ---

    /// Number of running apps.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Running app ids in start order (oldest first).
    pub fn running_ids(&self) -> &[AppId] {
        &self.running
    }

    /// Installed app ids in id order.
    pub fn installed_ids(&self) -> Vec<AppId> {
        self.installed.keys().map(|&k| AppId(k)).collect()
    }

    /// The app whose screen is in front, if any.
    pub fn active_app(&self) -> Option<AppId> {
        self.active
    }

    /// Lifecycle status of an installed app.
    pub fn status_of(&self, id: AppId) -> Option<Status> {
        self.installed.get(&id.0).map(AppEntry::status)
    }

    /// Whether the id names an installed app.
    pub fn is_installed(&self, id: AppId) -> bool {
        self.installed.contains_key(&id.0)
    }

    /// Whether the id names a running app.
    pub fn is_running(&self, id: AppId) -> bool {
        self.running.contains(&id)
    }

    /// Running app by recency index: 0 is the most recently started.
    pub fn running_app_at(&self, index: usize) -> Option<AppId> {
        if index >= self.running.len() {
            return None;
        }
        Some(self.running[self.running.len() - index - 1])
    }

    /// The entry for an installed app.
    pub fn entry(&self, id: AppId) -> Option<&AppEntry> {
        self.installed.get(&id.0)
    }

    // --- Internals ---

    fn collect_deferred(&mut self, id: AppId) {
        if let Some(entry) = self.installed.get_mut(&id.0)
            && let Some(screen) = entry.take_pending_unload()
        {
            self.pending_cleanups.push((screen, id));
        }
    }

    /// An entry force-closed itself mid-operation; finish the manager-side
    /// bookkeeping a normal close would have done.
    fn reap_closed(&mut self, ctx: &Context, display: &Display, id: AppId) {
        self.snapshots.remove(&id.0);
        let was_active = self.active == Some(id);
        if let Err(e) = display.process_app_close(ctx, was_active) {
            error!(app_id = %id, %e, "display close failed");
        }
        self.running.retain(|&r| r != id);
        if was_active {
            self.active = None;
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("installed", &self.installed.len())
            .field("running", &self.running)
            .field("active", &self.active)
            .field("next_id", &self.next_id)
            .field("pending_cleanups", &self.pending_cleanups.len())
            .finish()
    }
}
