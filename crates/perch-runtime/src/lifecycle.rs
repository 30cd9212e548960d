#![forbid(unsafe_code)]

//! The per-app lifecycle state machine.
//!
//! [`AppEntry`] is the framework's record for one installed app: status,
//! calibrated configuration, saved themes and screens, and the app's
//! [`ResourceTracker`]. The `process_*` methods drive the transitions
//! `Uninstalled → Closed → Running ⇄ Paused → Closed → Uninstalled`.
//!
//! Two rules shape everything here. First, every hook that can create
//! kernel objects (`run`, `resume`) executes inside a start/stop recording
//! bracket, so created resources are attributable to exactly the phase that
//! made them. Second, failure during run/resume/pause is answered with a
//! forced close rather than an inconsistent visible state, and close itself
//! cannot fail outward — it logs, finishes its teardown, and lands on
//! `Closed` regardless.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use perch_core::geometry::{Area, Size};
use perch_gfx::{ClassId, GfxError, ScreenHandle, Theme};
use tracing::{debug, error, warn};

use crate::app::{App, AppFlags, AppId, HookCtx, Status};
use crate::context::Context;
use crate::tracker::ResourceTracker;

/// Lifecycle error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The app is not installed.
    NotInstalled,
    /// The app is already installed.
    AlreadyInstalled,
    /// The app's configured name is empty.
    InvalidName,
    /// An app hook reported failure.
    Hook {
        /// Which hook failed.
        phase: &'static str,
        /// The hook's message.
        message: String,
    },
    /// A kernel operation failed.
    Gfx(GfxError),
    /// After `run`, the active screen was still the pre-run screen: the app
    /// never loaded one of its own.
    NoAppScreen,
    /// The display has no theme to save.
    NoTheme,
    /// Resource recording came back incomplete.
    RecordIncomplete,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::NotInstalled => write!(f, "app is not installed"),
            LifecycleError::AlreadyInstalled => write!(f, "app is already installed"),
            LifecycleError::InvalidName => write!(f, "app name is empty"),
            LifecycleError::Hook { phase, message } => {
                write!(f, "app {phase} hook failed: {message}")
            }
            LifecycleError::Gfx(e) => write!(f, "kernel operation failed: {e}"),
            LifecycleError::NoAppScreen => write!(f, "app did not load a screen"),
            LifecycleError::NoTheme => write!(f, "display has no theme"),
            LifecycleError::RecordIncomplete => write!(f, "resource recording incomplete"),
        }
    }
}

impl std::error::Error for LifecycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LifecycleError::Gfx(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GfxError> for LifecycleError {
    fn from(e: GfxError) -> Self {
        LifecycleError::Gfx(e)
    }
}

/// Calibrated copy of the app's configuration, valid while installed.
#[derive(Debug, Clone, Copy, Default)]
struct ActiveConfig {
    size: Size,
    flags: AppFlags,
}

/// Object class used for core-created default screens.
const DEFAULT_SCREEN_CLASS: ClassId = ClassId(3);

/// The framework's per-app record.
pub struct AppEntry {
    app: Rc<RefCell<dyn App>>,
    name: String,
    status: Status,
    id: Option<AppId>,
    active: ActiveConfig,
    is_closing: bool,

    // Saved display state, restored when leaving the app's context.
    saved_resolution: Size,
    display_theme: Option<Theme>,
    app_theme: Option<Theme>,

    origin_visual_area: Area,
    visual_area: Area,

    last_screen: Option<ScreenHandle>,
    active_screen: Option<ScreenHandle>,

    tracker: ResourceTracker,
    // Set by a deferred close; the manager completes it on screen unload.
    pending_unload: Option<ScreenHandle>,
}

impl AppEntry {
    /// Wrap an app the host handed in. The entry starts uninstalled.
    pub(crate) fn new(app: Rc<RefCell<dyn App>>) -> Self {
        let name = app.borrow().config().name.clone();
        Self {
            app,
            name,
            status: Status::Uninstalled,
            id: None,
            active: ActiveConfig::default(),
            is_closing: false,
            saved_resolution: Size::default(),
            display_theme: None,
            app_theme: None,
            origin_visual_area: Area::default(),
            visual_area: Area::default(),
            last_screen: None,
            active_screen: None,
            tracker: ResourceTracker::default(),
            pending_unload: None,
        }
    }

    /// Whether this entry wraps the same app value.
    pub(crate) fn same_app(&self, other: &Rc<RefCell<dyn App>>) -> bool {
        Rc::ptr_eq(&self.app, other)
    }

    /// The app's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The assigned id while installed.
    pub fn id(&self) -> Option<AppId> {
        self.id
    }

    /// The calibrated visual area.
    pub fn visual_area(&self) -> Area {
        self.visual_area
    }

    /// The app's most recent screen.
    pub fn active_screen(&self) -> Option<ScreenHandle> {
        self.active_screen
    }

    /// The option flags in effect.
    pub fn flags(&self) -> AppFlags {
        self.active.flags
    }

    /// The resource tracker (for inspection).
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Take the screen a deferred close is waiting on, if any.
    pub(crate) fn take_pending_unload(&mut self) -> Option<ScreenHandle> {
        self.pending_unload.take()
    }

    fn is_installed(&self) -> bool {
        self.status != Status::Uninstalled
    }

    fn run_hook(
        &self,
        ctx: &Context,
        phase: &'static str,
        f: impl FnOnce(&mut dyn App, &mut HookCtx<'_>) -> Result<(), crate::app::HookError>,
    ) -> Result<(), LifecycleError> {
        let mut hook_ctx = HookCtx {
            gfx: ctx.gfx(),
            queue: ctx.queue(),
            id: self.id.unwrap_or(AppId(0)),
            visual_area: self.visual_area,
            is_closing: self.is_closing,
        };
        let mut app = self.app.borrow_mut();
        f(&mut *app, &mut hook_ctx).map_err(|e| LifecycleError::Hook {
            phase,
            message: e.to_string(),
        })
    }

    // --- Install / uninstall ---

    /// `Uninstalled → Closed`. All-or-nothing: any failure rolls back
    /// through uninstall.
    pub(crate) fn process_install(
        &mut self,
        ctx: &Context,
        id: AppId,
    ) -> Result<(), LifecycleError> {
        if self.is_installed() {
            return Err(LifecycleError::AlreadyInstalled);
        }
        let (name, screen_size, flags) = {
            let app = self.app.borrow();
            let cfg = app.config();
            (cfg.name.clone(), cfg.screen_size, cfg.flags)
        };
        if name.is_empty() {
            return Err(LifecycleError::InvalidName);
        }
        debug!(app = %name, app_id = %id, "install");

        self.name = name;
        self.active = ActiveConfig {
            size: screen_size.calibrate(ctx.display_size()),
            flags,
        };
        self.id = Some(id);
        self.status = Status::Closed;

        if let Err(e) = self.run_hook(ctx, "init", |app, h| app.init(h)) {
            error!(app = %self.name, %e, "init failed, rolling back");
            self.process_uninstall(ctx);
            return Err(e);
        }
        Ok(())
    }

    /// `* → Uninstalled`. Never fails outward: every step is attempted and
    /// failures are logged, so the manager's bookkeeping stays consistent.
    pub(crate) fn process_uninstall(&mut self, ctx: &Context) {
        if !self.is_installed() {
            warn!(app = %self.name, "uninstall of app that is not installed");
            return;
        }
        debug!(app = %self.name, "uninstall");

        if self.active.flags.contains(AppFlags::DEFAULT_SCREEN) {
            self.clean_default_screen(ctx);
        }
        if let Err(e) = self.run_hook(ctx, "deinit", |app, h| app.deinit(h)) {
            error!(app = %self.name, %e, "deinit failed");
        }

        self.status = Status::Uninstalled;
        self.id = None;
        self.active = ActiveConfig::default();
        self.is_closing = false;
        self.saved_resolution = Size::default();
        self.display_theme = None;
        self.app_theme = None;
        self.origin_visual_area = Area::default();
        self.visual_area = Area::default();
        self.last_screen = None;
        self.active_screen = None;
        self.tracker.reset();
        self.pending_unload = None;
    }

    // --- Run / resume / pause / close ---

    /// `Closed → Running`. On failure the app is force-closed before the
    /// error is reported.
    pub(crate) fn process_run(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        if !self.is_installed() {
            return Err(LifecycleError::NotInstalled);
        }
        debug!(app = %self.name, "run");

        // Remember whatever is on screen now; nothing to require yet.
        self.save_recent_screen(ctx, false).ok();
        self.tracker.reset();
        self.start_record(ctx);

        let mut result = Ok(());
        if self.active.flags.contains(AppFlags::DEFAULT_SCREEN) {
            result = self.init_default_screen(ctx);
        }
        if result.is_ok() {
            result = self.save_display_theme(ctx);
        }
        if result.is_ok() {
            debug!(app = %self.name, "do run");
            result = self.run_hook(ctx, "run", |app, h| app.run(h));
        }
        // The bracket closes no matter how the hook fared; otherwise the
        // resources it did create would be unattributable.
        if !self.stop_record(ctx) && result.is_ok() {
            result = Err(LifecycleError::RecordIncomplete);
        }
        if result.is_ok() {
            // Now a screen of the app's own must be in front.
            result = self.save_recent_screen(ctx, true);
        }

        match result {
            Ok(()) => {
                self.status = Status::Running;
                Ok(())
            }
            Err(e) => {
                error!(app = %self.name, %e, "run failed, forcing close");
                self.process_close(ctx, true);
                Err(e)
            }
        }
    }

    /// `Paused/Closed → Running` along the resume path.
    pub(crate) fn process_resume(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        if !self.is_installed() {
            return Err(LifecycleError::NotInstalled);
        }
        debug!(app = %self.name, "resume");

        let mut result = self.load_recent_screen(ctx);
        if result.is_ok() {
            // The app theme only exists once a pause saved one; resuming an
            // app that never paused keeps the current theme.
            if let Err(e) = self.load_app_theme(ctx) {
                debug!(app = %self.name, %e, "no app theme to restore");
            }
        }
        if result.is_ok() {
            self.start_record(ctx);
            debug!(app = %self.name, "do resume");
            result = self.run_hook(ctx, "resume", |app, h| app.resume(h));
            if !self.stop_record(ctx) && result.is_ok() {
                result = Err(LifecycleError::RecordIncomplete);
            }
        }

        match result {
            Ok(()) => {
                self.status = Status::Running;
                Ok(())
            }
            Err(e) => {
                error!(app = %self.name, %e, "resume failed, forcing close");
                self.process_close(ctx, true);
                Err(e)
            }
        }
    }

    /// `Running → Paused`.
    pub(crate) fn process_pause(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        if !self.is_installed() {
            return Err(LifecycleError::NotInstalled);
        }
        debug!(app = %self.name, "pause");

        let mut result = self.run_hook(ctx, "pause", |app, h| app.pause(h));
        if result.is_ok() {
            result = self.save_app_theme(ctx);
        }
        if result.is_ok() {
            result = self.save_recent_screen(ctx, false);
        }
        if result.is_ok() {
            result = self.load_display_theme(ctx);
        }

        match result {
            Ok(()) => {
                self.status = Status::Paused;
                Ok(())
            }
            Err(e) => {
                error!(app = %self.name, %e, "pause failed, forcing close");
                self.process_close(ctx, true);
                Err(e)
            }
        }
    }

    /// `* → Closed`. Cannot fail outward.
    ///
    /// When the app's screen is the one in front (`is_app_active`), resource
    /// cleanup is deferred until the kernel reports that screen unloaded;
    /// [`Self::take_pending_unload`] tells the manager which screen to watch
    /// for. Otherwise cleanup runs immediately.
    pub(crate) fn process_close(&mut self, ctx: &Context, is_app_active: bool) {
        if !self.is_installed() {
            warn!(app = %self.name, "close of app that is not installed");
            return;
        }
        if self.is_closing {
            debug!(app = %self.name, "close already in progress");
            return;
        }
        self.is_closing = true;
        debug!(app = %self.name, is_app_active, "close");

        if let Err(e) = self.run_hook(ctx, "close", |app, h| app.close(h)) {
            error!(app = %self.name, %e, "close hook failed");
        }

        if is_app_active {
            self.save_recent_screen(ctx, false).ok();
            // Deleting the visible screen mid-transition would tear the
            // display; wait for the kernel to report it unloaded.
            let target = ctx.device().pending_screen().or(self.active_screen);
            match target {
                Some(screen) if ctx.device().screen_identity(screen).is_some() => {
                    debug!(app = %self.name, ?screen, "deferring cleanup until unload");
                    self.pending_unload = Some(screen);
                }
                _ => {
                    warn!(app = %self.name, "no screen to wait for, cleaning immediately");
                    self.run_cleanup(ctx);
                }
            }
        } else {
            self.run_cleanup(ctx);
        }

        if let Err(e) = self.load_display_theme(ctx) {
            warn!(app = %self.name, %e, "restore display theme failed");
        }

        self.is_closing = false;
        self.status = Status::Closed;
    }

    /// Complete a deferred close after the kernel unloaded the app's screen.
    pub(crate) fn finish_deferred_cleanup(&mut self, ctx: &Context) {
        debug!(app = %self.name, "deferred cleanup");
        self.run_cleanup(ctx);
    }

    /// Deliver a back event to the app.
    pub(crate) fn process_back(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        if !self.is_installed() {
            return Err(LifecycleError::NotInstalled);
        }
        self.run_hook(ctx, "back", |app, h| app.back(h))
    }

    /// Reposition a tracked screen after the kernel loaded it, keeping it
    /// inside the visual area.
    pub(crate) fn on_screen_loaded(&self, ctx: &Context, screen: ScreenHandle) {
        if self.active.flags.contains(AppFlags::RESIZE_VISUAL_AREA)
            && self.tracker.tracks_screen(screen)
            && ctx
                .device()
                .set_screen_pos(screen, self.visual_area.origin())
                .is_err()
        {
            warn!(app = %self.name, ?screen, "reposition of loaded screen failed");
        }
    }

    fn run_cleanup(&mut self, ctx: &Context) {
        if let Err(e) = self.run_hook(ctx, "clean_resource", |app, h| app.clean_resource(h)) {
            error!(app = %self.name, %e, "clean_resource hook failed");
        }
        if self.active.flags.contains(AppFlags::RECYCLE_RESOURCES) {
            let mut dev = ctx.device();
            if !self.tracker.cleanup(&mut *dev) {
                error!(app = %self.name, "recorded resource cleanup incomplete");
            }
            self.active_screen = None;
        } else if self.active.flags.contains(AppFlags::DEFAULT_SCREEN) {
            self.clean_default_screen(ctx);
        }
    }

    // --- Visual area ---

    /// Remember the region the display granted this app.
    pub(crate) fn set_visual_area(&mut self, area: Area) {
        self.origin_visual_area = area;
    }

    /// Center the app's calibrated size inside the granted region.
    pub(crate) fn calibrate_visual_area(&mut self) {
        self.visual_area = self.origin_visual_area.fit_centered(self.active.size);
        debug!(
            app = %self.name,
            area = ?self.visual_area,
            "visual area calibrated"
        );
    }

    // --- Recording brackets ---

    fn start_record(&mut self, ctx: &Context) {
        if self.tracker.is_recording() {
            debug!(app = %self.name, "recording already started");
            return;
        }
        let mut dev = ctx.device();
        if self.active.flags.contains(AppFlags::RESIZE_VISUAL_AREA) {
            self.saved_resolution = dev.resolution();
            dev.set_resolution(self.visual_area.size());
            debug!(
                app = %self.name,
                area = ?self.visual_area,
                "display shrunk to visual area"
            );
        }
        self.tracker.start(&*dev);
    }

    fn stop_record(&mut self, ctx: &Context) -> bool {
        if !self.tracker.is_recording() {
            debug!(app = %self.name, "recording not started");
            return true;
        }
        let mut dev = ctx.device();
        let intact = self.tracker.stop(&*dev);
        if self.active.flags.contains(AppFlags::RESIZE_VISUAL_AREA) {
            dev.set_resolution(self.saved_resolution);
            // Newly recorded screens belong inside the visual area.
            for &screen in self.tracker.screens() {
                if dev
                    .set_screen_pos(screen, self.visual_area.origin())
                    .is_err()
                {
                    warn!(app = %self.name, ?screen, "screen reposition failed");
                }
            }
        }
        intact
    }

    // --- Screens ---

    fn init_default_screen(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        let mut dev = ctx.device();
        let screen = dev.create_screen(DEFAULT_SCREEN_CLASS);
        dev.load_screen(screen)?;
        self.active_screen = Some(screen);
        debug!(app = %self.name, ?screen, "default screen created");
        Ok(())
    }

    fn clean_default_screen(&mut self, ctx: &Context) {
        if let Some(screen) = self.active_screen.take() {
            if ctx.device().delete_screen(screen).is_err() {
                warn!(app = %self.name, ?screen, "default screen already cleaned");
            }
        }
    }

    fn save_recent_screen(
        &mut self,
        ctx: &Context,
        check_valid: bool,
    ) -> Result<(), LifecycleError> {
        let active = ctx.device().active_screen();
        match active {
            Some(screen) => {
                if check_valid && Some(screen) == self.last_screen {
                    return Err(LifecycleError::NoAppScreen);
                }
                self.active_screen = Some(screen);
                self.last_screen = Some(screen);
                Ok(())
            }
            None if check_valid => Err(LifecycleError::NoAppScreen),
            // Nothing on screen yet; best-effort save has nothing to do.
            None => Ok(()),
        }
    }

    fn load_recent_screen(&self, ctx: &Context) -> Result<(), LifecycleError> {
        let screen = self.active_screen.ok_or(LifecycleError::NoAppScreen)?;
        let mut dev = ctx.device();
        if dev.screen_identity(screen).is_none() {
            return Err(LifecycleError::NoAppScreen);
        }
        dev.load_screen(screen)?;
        Ok(())
    }

    // --- Themes ---

    fn save_display_theme(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        let theme = ctx.device().theme().ok_or(LifecycleError::NoTheme)?;
        self.display_theme = Some(theme);
        Ok(())
    }

    fn load_display_theme(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        let theme = self.display_theme.ok_or(LifecycleError::NoTheme)?;
        ctx.device().set_theme(theme);
        Ok(())
    }

    fn save_app_theme(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        let theme = ctx.device().theme().ok_or(LifecycleError::NoTheme)?;
        self.app_theme = Some(theme);
        Ok(())
    }

    fn load_app_theme(&mut self, ctx: &Context) -> Result<(), LifecycleError> {
        let theme = self.app_theme.ok_or(LifecycleError::NoTheme)?;
        ctx.device().set_theme(theme);
        Ok(())
    }
}

impl fmt::Debug for AppEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEntry")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("id", &self.id)
            .field("is_closing", &self.is_closing)
            .field("visual_area", &self.visual_area)
            .finish()
    }
}
