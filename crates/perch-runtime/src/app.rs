#![forbid(unsafe_code)]

//! The app contract.
//!
//! Apps implement [`App`]: `run` and `back` are mandatory, everything else
//! defaults to a no-op. Hooks receive a [`HookCtx`] granting access to the
//! graphics kernel, the app's calibrated visual area, and
//! [`HookCtx::notify_closed`] for requesting shutdown from a back handler.
//!
//! The framework never owns the app value: the host hands in an
//! `Rc<RefCell<dyn App>>` and keeps its own handle; installation only shares
//! it.

use std::cell::RefMut;
use std::fmt;

use bitflags::bitflags;
use perch_core::geometry::{Area, SizeSpec};
use perch_gfx::GfxDevice;

use crate::context::{SystemEvent, SystemEventQueue};

/// Unique app identifier, assigned at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub u32);

impl AppId {
    /// The smallest id the manager ever assigns.
    pub const MIN: AppId = AppId(1);
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Per-app option flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AppFlags: u8 {
        /// The core creates, loads, and later destroys a scratch screen
        /// around `run`; the app draws on the active screen instead of
        /// managing its own.
        const DEFAULT_SCREEN = 1;
        /// The core deletes all recorded resources automatically on close.
        /// Without it the app must clean up in its own hooks.
        const RECYCLE_RESOURCES = 1 << 1;
        /// The core temporarily shrinks the reported display resolution
        /// during recorded intervals so the app lays out inside its visual
        /// sub-area (e.g. below a status bar).
        const RESIZE_VISUAL_AREA = 1 << 2;
    }
}

/// Init-time app configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Display name, also used in logs.
    pub name: String,
    /// Requested screen size, resolved against the display at install.
    pub screen_size: SizeSpec,
    /// Option flags.
    pub flags: AppFlags,
}

impl AppConfig {
    /// Basic configuration: full-screen app with resource recycling and
    /// visual-area resizing on, matching what nearly every app wants.
    pub fn new(name: impl Into<String>, use_default_screen: bool) -> Self {
        let mut flags = AppFlags::RECYCLE_RESOURCES | AppFlags::RESIZE_VISUAL_AREA;
        if use_default_screen {
            flags |= AppFlags::DEFAULT_SCREEN;
        }
        Self {
            name: name.into(),
            screen_size: SizeSpec::FULL,
            flags,
        }
    }

    /// Replace the screen-size request.
    #[must_use]
    pub fn with_screen_size(mut self, screen_size: SizeSpec) -> Self {
        self.screen_size = screen_size;
        self
    }

    /// Replace the option flags.
    #[must_use]
    pub fn with_flags(mut self, flags: AppFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Lifecycle status of an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Not installed; both the initial and the final state.
    #[default]
    Uninstalled,
    /// Installed but not running.
    Closed,
    /// Running in the foreground or background.
    Running,
    /// Running but backgrounded.
    Paused,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Uninstalled => write!(f, "uninstalled"),
            Status::Closed => write!(f, "closed"),
            Status::Running => write!(f, "running"),
            Status::Paused => write!(f, "paused"),
        }
    }
}

/// Failure reported by an app hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Create a hook error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HookError {}

/// What a hook may touch while it runs.
pub struct HookCtx<'a> {
    pub(crate) gfx: &'a std::rc::Rc<std::cell::RefCell<dyn GfxDevice>>,
    pub(crate) queue: &'a SystemEventQueue,
    pub(crate) id: AppId,
    pub(crate) visual_area: Area,
    pub(crate) is_closing: bool,
}

impl HookCtx<'_> {
    /// Mutable access to the graphics kernel.
    ///
    /// The borrow must not be held across a call back into the framework.
    pub fn gfx(&self) -> RefMut<'_, dyn GfxDevice> {
        self.gfx.borrow_mut()
    }

    /// The id assigned to this app.
    pub fn app_id(&self) -> AppId {
        self.id
    }

    /// The calibrated region this app may render into.
    pub fn visual_area(&self) -> Area {
        self.visual_area
    }

    /// Ask the core to close this app.
    ///
    /// Meant for `back` handlers. A no-op while a close is already in
    /// progress, so a close hook cannot re-enter the close path. Returns
    /// whether the request was posted.
    pub fn notify_closed(&self) -> bool {
        if self.is_closing {
            return false;
        }
        self.queue.post(SystemEvent::AppStop(self.id));
        true
    }
}

/// The lifecycle hooks an app provides.
///
/// Only [`App::run`] and [`App::back`] are mandatory. Hooks return
/// `Err` to report failure; the core responds by forcing the app closed
/// rather than leaving it half-visible.
pub trait App {
    /// The app's configuration. Read once at install time.
    fn config(&self) -> &AppConfig;

    /// Entry point: create all UI resources here.
    ///
    /// With [`AppFlags::DEFAULT_SCREEN`] the core has already created and
    /// loaded a scratch screen; otherwise the app must create and load its
    /// own screen before returning.
    fn run(&mut self, ctx: &mut HookCtx<'_>) -> Result<(), HookError>;

    /// A back navigation reached this app. Call [`HookCtx::notify_closed`]
    /// to exit.
    fn back(&mut self, ctx: &mut HookCtx<'_>) -> Result<(), HookError>;

    /// The app is being installed.
    fn init(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// The app is being uninstalled.
    fn deinit(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// The app is moving to the background.
    fn pause(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// The app is returning to the foreground.
    fn resume(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// The app is closing. Do not call [`HookCtx::notify_closed`] here.
    fn close(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Last chance to free resources the recorder never saw (created
    /// outside any recorded interval).
    fn clean_resource(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_enable_recycle_and_resize() {
        let cfg = AppConfig::new("clock", true);
        assert!(cfg.flags.contains(AppFlags::DEFAULT_SCREEN));
        assert!(cfg.flags.contains(AppFlags::RECYCLE_RESOURCES));
        assert!(cfg.flags.contains(AppFlags::RESIZE_VISUAL_AREA));

        let cfg = AppConfig::new("clock", false);
        assert!(!cfg.flags.contains(AppFlags::DEFAULT_SCREEN));
    }

    #[test]
    fn config_builders_replace_fields() {
        let cfg = AppConfig::new("game", false)
            .with_flags(AppFlags::RECYCLE_RESOURCES)
            .with_screen_size(SizeSpec::Percent {
                width: 50,
                height: 50,
            });
        assert_eq!(cfg.flags, AppFlags::RECYCLE_RESOURCES);
        assert!(matches!(cfg.screen_size, SizeSpec::Percent { .. }));
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(Status::Running.to_string(), "running");
        assert_eq!(Status::Uninstalled.to_string(), "uninstalled");
    }
}
