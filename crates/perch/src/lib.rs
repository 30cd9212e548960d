#![forbid(unsafe_code)]

//! Perch
//!
//! A phone-style app-shell framework for embedded devices: an app lifecycle
//! core with differential resource tracking, a publish/subscribe event bus,
//! an admission-controlled app manager, and behavior-level shell widgets,
//! all layered over an abstract graphics kernel.
//!
//! # Quick start
//!
//! ```ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use perch::prelude::*;
//!
//! let gfx: Rc<RefCell<dyn GfxDevice>> = /* your kernel binding */;
//! let mut system = System::new(data, gfx);
//! system.begin()?;
//! let id = system.install(my_app)?;
//! system.start(id)?;
//! loop {
//!     system.pump(); // from the kernel's render loop
//! }
//! ```
//!
//! The crates underneath, re-exported here:
//! - `perch-core` — geometry, GUI lock, logging
//! - `perch-gfx` — the graphics-kernel boundary (and a simulated kernel
//!   behind the `sim` feature)
//! - `perch-runtime` — lifecycle, tracker, bus, manager, system
//! - `perch-widgets` — status bar, navigation bar, launcher, recents,
//!   gesture recognizer

pub use perch_core;
pub use perch_gfx;
pub use perch_runtime;
pub use perch_widgets;

/// The commonly needed surface in one import.
pub mod prelude {
    pub use perch_core::geometry::{Area, Point, Size, SizeSpec};
    pub use perch_core::lock::{GuiLock, LockHooks};
    pub use perch_gfx::{GfxDevice, GfxEvent, ScreenHandle};
    pub use perch_runtime::{
        App, AppConfig, AppFlags, AppId, Context, ContextData, DisplayData, EventBus, HookCtx,
        HookError, Manager, ManagerData, ManagerFlags, NavigateKind, Status, System, SystemEvent,
        SystemEventQueue,
    };
    pub use perch_widgets::{
        AppLauncher, Gesture, GestureData, NavigationBar, RecentsScreen, StatusBar,
    };
}
