#![forbid(unsafe_code)]

//! Kernel object handles and identity attributes.
//!
//! Handles are opaque slot indices into pools the kernel owns. A slot can be
//! reused after its object is deleted, so a handle alone never proves the
//! object it once named still exists. Each kind therefore carries secondary
//! identity attributes: two fields that unrelated objects are overwhelmingly
//! unlikely to share. Cleanup compares the live attributes against the
//! recorded ones and skips the slot on mismatch.

use std::fmt;

/// Handle to a screen in the kernel's screen array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScreenHandle(pub u32);

/// Handle to a timer in the kernel's timer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u32);

/// Handle to an animation in the kernel's animation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimHandle(pub u32);

/// Kernel object class token (stands in for the class pointer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

impl ClassId {
    /// The plain screen/container class.
    pub const OBJECT: ClassId = ClassId(1);
}

/// Opaque callback token (stands in for a function pointer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub u64);

/// Opaque user-data token (stands in for a user-data pointer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserToken(pub u64);

impl UserToken {
    /// The null user-data token.
    pub const NONE: UserToken = UserToken(0);
}

/// Opaque display theme token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Theme(pub u32);

/// Identity attributes of a screen: class plus parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenIdentity {
    /// Object class of the screen.
    pub class: ClassId,
    /// Parent screen, `None` for top-level screens.
    pub parent: Option<ScreenHandle>,
}

/// Identity attributes of a timer: callback plus user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerIdentity {
    /// The timer callback.
    pub callback: CallbackToken,
    /// The user data passed to the callback.
    pub user_data: UserToken,
}

/// Identity attributes of an animation: animated variable plus exec callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimIdentity {
    /// The animated variable.
    pub var: UserToken,
    /// The exec callback applying animation values.
    pub exec: CallbackToken,
}

/// The three kinds of kernel objects perch tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A top-level screen object.
    Screen,
    /// A periodic timer.
    Timer,
    /// A running animation.
    Animation,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Screen => write!(f, "screen"),
            ResourceKind::Timer => write!(f, "timer"),
            ResourceKind::Animation => write!(f, "animation"),
        }
    }
}

/// Error from a kernel boundary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxError {
    /// The handle does not name a live object of this kind.
    Stale {
        /// Which pool the handle belongs to.
        kind: ResourceKind,
        /// The raw slot index.
        slot: u32,
    },
    /// No screen is currently loaded.
    NoActiveScreen,
}

impl fmt::Display for GfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GfxError::Stale { kind, slot } => {
                write!(f, "stale {kind} handle (slot {slot})")
            }
            GfxError::NoActiveScreen => write!(f, "no active screen"),
        }
    }
}

impl std::error::Error for GfxError {}
