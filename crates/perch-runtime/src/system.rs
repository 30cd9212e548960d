#![forbid(unsafe_code)]

//! The assembled shell system.
//!
//! [`System`] bundles [`Context`], [`Display`], and [`Manager`] behind one
//! cooperative surface. Everything runs to completion on the caller's
//! thread; [`System::pump`] is the tick that drains kernel events (deferred
//! cleanup completions, screen repositioning) and queued lifecycle requests
//! (start/stop/navigate posted by widgets or app hooks).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use perch_gfx::{GfxDevice, GfxEvent};
use tracing::{debug, error};

use crate::app::{App, AppId};
use crate::context::{Context, ContextData, ContextError, NavigateKind, SystemEvent};
use crate::display::{Display, DisplayError};
use crate::manager::{Manager, ManagerError};

/// System error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// Context initialization failed.
    Context(ContextError),
    /// Display initialization failed.
    Display(DisplayError),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::Context(e) => write!(f, "context: {e}"),
            SystemError::Display(e) => write!(f, "display: {e}"),
        }
    }
}

impl std::error::Error for SystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SystemError::Context(e) => Some(e),
            SystemError::Display(e) => Some(e),
        }
    }
}

impl From<ContextError> for SystemError {
    fn from(e: ContextError) -> Self {
        SystemError::Context(e)
    }
}

impl From<DisplayError> for SystemError {
    fn from(e: DisplayError) -> Self {
        SystemError::Display(e)
    }
}

/// Bound on pump passes per tick, in case completions keep posting work.
const PUMP_PASS_LIMIT: usize = 16;

/// Context + Display + Manager, assembled.
pub struct System {
    ctx: Context,
    display: Display,
    manager: Manager,
}

impl System {
    /// Assemble a system over the given kernel device.
    pub fn new(data: ContextData, gfx: Rc<RefCell<dyn GfxDevice>>) -> Self {
        let display = Display::new(data.display);
        let manager = Manager::new(data.manager);
        let ctx = Context::new(data, gfx);
        Self {
            ctx,
            display,
            manager,
        }
    }

    /// Initialize: calibrate the context, then create the main screen.
    pub fn begin(&mut self) -> Result<(), SystemError> {
        self.ctx.begin()?;
        self.display.calibrate(self.ctx.display_size());
        self.display.begin(&self.ctx)?;
        // The begin-time load event is uninteresting; start clean.
        self.ctx.device().take_events();
        Ok(())
    }

    /// The shared context.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    /// Mutable access to the shared context.
    pub fn ctx_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// The display.
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// The manager.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Install an app.
    pub fn install(&mut self, app: Rc<RefCell<dyn App>>) -> Result<AppId, ManagerError> {
        self.manager.install_app(&self.ctx, &self.display, app)
    }

    /// Uninstall an app.
    pub fn uninstall(&mut self, id: AppId) -> Result<(), ManagerError> {
        self.manager.uninstall_app(&self.ctx, &self.display, id)
    }

    /// Start (or resume) an app.
    pub fn start(&mut self, id: AppId) -> Result<(), ManagerError> {
        self.manager.start_app(&self.ctx, &self.display, id)
    }

    /// Close a running app.
    pub fn stop(&mut self, id: AppId) -> Result<(), ManagerError> {
        self.manager.close_app(&self.ctx, &self.display, id)
    }

    /// Navigate the shell.
    pub fn navigate(&mut self, kind: NavigateKind) -> Result<(), ManagerError> {
        self.manager.navigate(&self.ctx, &self.display, kind)
    }

    /// One cooperative tick: drain kernel events, then queued lifecycle
    /// requests, repeating while either produces more work.
    pub fn pump(&mut self) {
        for _ in 0..PUMP_PASS_LIMIT {
            let kernel_events = self.ctx.device().take_events();
            let requests = self.ctx.queue().drain();
            if kernel_events.is_empty() && requests.is_empty() {
                return;
            }

            for event in kernel_events {
                debug!(?event, "kernel event");
                match event {
                    GfxEvent::ScreenUnloaded(screen) => {
                        self.manager.complete_unload(&self.ctx, screen);
                    }
                    GfxEvent::ScreenLoaded(screen) => {
                        self.manager.on_screen_loaded(&self.ctx, screen);
                    }
                }
            }

            for request in requests {
                debug!(?request, "system request");
                self.ctx.broadcast_request(&request);
                let result = match request {
                    SystemEvent::AppStart(id) => self.start(id),
                    SystemEvent::AppStop(id) => self.stop(id),
                    SystemEvent::Navigate(kind) => self.navigate(kind),
                };
                if let Err(e) = result {
                    error!(%e, "system request failed");
                }
            }
        }
        debug!("pump pass limit reached, leaving remainder for next tick");
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("ctx", &self.ctx)
            .field("manager", &self.manager)
            .finish()
    }
}
