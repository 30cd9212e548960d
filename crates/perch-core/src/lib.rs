#![forbid(unsafe_code)]

//! Perch Core
//!
//! Foundation types shared by every perch crate: pixel geometry for display
//! and widget layout, the reentrant GUI-lock bookkeeping wrapper, and
//! logging re-exports.
//!
//! # Role in Perch
//! `perch-core` sits at the bottom of the dependency graph. It knows nothing
//! about apps, screens, or the graphics kernel; it only provides the
//! vocabulary ([`Area`], [`Size`], [`SizeSpec`]) and the synchronization
//! bookkeeping ([`GuiLock`]) the upper layers build on.

pub mod geometry;
pub mod lock;
pub mod logging;

pub use geometry::{Area, Point, Size, SizeSpec};
pub use lock::{GuiLock, GuiLockGuard, LockError, LockHooks};
