#![forbid(unsafe_code)]

//! Perch Runtime
//!
//! The orchestrator of the perch shell: the per-app lifecycle state machine,
//! the differential resource tracker that attributes kernel objects to the
//! lifecycle phase that created them, the publish/subscribe event bus, and
//! the manager that admits, evicts, and routes apps.
//!
//! # Key Components
//!
//! - [`ResourceTracker`] - snapshot-based recorder of screens/timers/
//!   animations created inside a bracketed interval, with identity-verified
//!   bulk cleanup
//! - [`App`] - the trait apps implement; `run` and `back` are mandatory,
//!   the remaining hooks default to no-ops
//! - [`Manager`] - installed/running bookkeeping, the running-app admission
//!   limit, and navigation routing
//! - [`EventBus`] - pub/sub keyed by (target, event id) with dynamic id
//!   allocation and recycling
//! - [`Context`] - the shared context: kernel device, bus, GUI lock, and
//!   the system event queue
//! - [`System`] - Context + Display + Manager bundled behind the
//!   cooperative [`System::pump`] tick
//!
//! # How it fits in the system
//! The runtime consumes the kernel boundary from `perch-gfx` and is consumed
//! by `perch-widgets` and by hosts. Control flows host → [`System`] →
//! [`Manager`] → per-app lifecycle → [`ResourceTracker`], with the kernel
//! event queue feeding completions back in through [`System::pump`].

pub mod app;
pub mod context;
pub mod display;
pub mod event_bus;
pub mod lifecycle;
pub mod manager;
pub mod system;
pub mod tracker;

pub use app::{App, AppConfig, AppFlags, AppId, HookCtx, HookError, Status};
pub use context::{
    Context, ContextData, ContextError, NavigateKind, SystemEvent, SystemEventQueue,
};
pub use display::{Display, DisplayData, DisplayError};
pub use event_bus::{EventBus, EventData, EventId, EventTarget, Handler, HandlerToken};
pub use lifecycle::LifecycleError;
pub use manager::{Manager, ManagerData, ManagerError, ManagerFlags};
pub use system::{System, SystemError};
pub use tracker::{ResourceTracker, TrackerConfig};
