#![forbid(unsafe_code)]

//! Perch Gfx
//!
//! The boundary between perch and the graphics kernel that actually owns
//! screens, timers, and animations. The kernel allocates those objects in
//! its own pools (a screen array, singly-linked timer and animation lists)
//! and hands out opaque slot handles that may be reused after deletion —
//! perch never owns them.
//!
//! # Key Components
//!
//! - Handle types ([`ScreenHandle`], [`TimerHandle`], [`AnimHandle`]) and
//!   their identity attributes ([`ScreenIdentity`], [`TimerIdentity`],
//!   [`AnimIdentity`]) used to detect stale handles before deletion
//! - [`GfxDevice`] - the object-safe capability trait the runtime consumes:
//!   enumerate-since-marker, read-identity, delete-if-valid, plus display
//!   resolution/theme/screen-load operations and a drained event queue
//! - [`sim::SimDevice`] (feature `sim`) - an in-memory kernel with
//!   lowest-slot-first handle reuse, used by every test and by headless
//!   hosts
//!
//! # Role in Perch
//! `perch-gfx` defines WHAT the kernel must provide; a production port
//! implements [`GfxDevice`] over the real kernel bindings and nothing above
//! this crate changes.

pub mod device;
pub mod handle;
#[cfg(feature = "sim")]
pub mod sim;

pub use device::{GfxDevice, GfxEvent, SnapshotBuf};
pub use handle::{
    AnimHandle, AnimIdentity, CallbackToken, ClassId, GfxError, ResourceKind, ScreenHandle,
    ScreenIdentity, Theme, TimerHandle, TimerIdentity, UserToken,
};
#[cfg(feature = "sim")]
pub use sim::SimDevice;
