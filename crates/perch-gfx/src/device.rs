#![forbid(unsafe_code)]

//! The graphics-kernel capability trait.
//!
//! [`GfxDevice`] is the complete set of primitives the runtime consumes:
//! screen-array enumeration, timer/animation list traversal, identity reads,
//! delete-if-valid operations, display resolution and theme access, screen
//! loading, and a drained event queue. It is deliberately narrow — nothing
//! above this crate may assume more about the kernel than what is here.
//!
//! List shape matters to the tracker: the kernel *appends* new screens to
//! its screen array but *prepends* new timers and animations to their
//! singly-linked lists, so objects created inside a recorded interval sit
//! after the remembered array index, respectively between the current head
//! and the remembered head.

use crate::handle::{
    AnimHandle, AnimIdentity, CallbackToken, ClassId, GfxError, ScreenHandle, ScreenIdentity,
    Theme, TimerHandle, TimerIdentity, UserToken,
};
use perch_core::geometry::{Point, Size};

/// An event drained from the kernel's queue.
///
/// Screen-load transitions are the one asynchronous boundary in the system:
/// a screen that is being replaced stays alive until the kernel reports it
/// unloaded, which is when deferred resource cleanup may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxEvent {
    /// A screen finished loading and is now active.
    ScreenLoaded(ScreenHandle),
    /// A previously active screen finished unloading.
    ScreenUnloaded(ScreenHandle),
}

/// An off-screen snapshot buffer owned by the manager.
///
/// Reused across snapshots while the dimensions match; reallocated
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBuf {
    width: i32,
    height: i32,
    data: Vec<u8>,
}

/// Bytes per pixel of snapshot data (RGB565).
const SNAPSHOT_BPP: usize = 2;

impl SnapshotBuf {
    /// Allocate a buffer for the given dimensions.
    pub fn new(size: Size) -> Self {
        let len = (size.width.max(0) as usize) * (size.height.max(0) as usize) * SNAPSHOT_BPP;
        Self {
            width: size.width,
            height: size.height,
            data: vec![0; len],
        }
    }

    /// Buffer dimensions.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Check whether the buffer already fits the given dimensions.
    pub fn matches(&self, size: Size) -> bool {
        self.width == size.width && self.height == size.height
    }

    /// Pixel data, row-major RGB565.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel data for the renderer to fill.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The graphics kernel as seen by perch.
///
/// All operations are infallible reads or delete-if-valid writes; a write
/// against a stale handle returns [`GfxError::Stale`] instead of touching an
/// unrelated object that may meanwhile occupy the slot.
pub trait GfxDevice {
    // --- Screens (array, appended on create) ---

    /// Number of screens in the kernel's screen array.
    fn screen_count(&self) -> usize;

    /// Screen at the given array index, if in range.
    fn screen_at(&self, index: usize) -> Option<ScreenHandle>;

    /// Create a new top-level screen of the given class.
    fn create_screen(&mut self, class: ClassId) -> ScreenHandle;

    /// Live identity attributes of a screen, `None` if the handle is stale.
    fn screen_identity(&self, screen: ScreenHandle) -> Option<ScreenIdentity>;

    /// Delete a screen. Fails on a stale handle.
    fn delete_screen(&mut self, screen: ScreenHandle) -> Result<(), GfxError>;

    /// Move a screen to the given position.
    fn set_screen_pos(&mut self, screen: ScreenHandle, pos: Point) -> Result<(), GfxError>;

    /// The currently active (loaded) screen.
    fn active_screen(&self) -> Option<ScreenHandle>;

    /// The screen currently mid-load (animated transition), if any.
    fn pending_screen(&self) -> Option<ScreenHandle>;

    /// Load a screen immediately, making it active.
    fn load_screen(&mut self, screen: ScreenHandle) -> Result<(), GfxError>;

    /// Load a screen through an animated transition.
    ///
    /// The default implementation loads immediately; kernels with transition
    /// support keep the old screen active until the transition completes.
    fn load_screen_animated(&mut self, screen: ScreenHandle) -> Result<(), GfxError> {
        self.load_screen(screen)
    }

    /// Render a screen into an off-screen buffer.
    fn snapshot_screen(&self, screen: ScreenHandle, buf: &mut SnapshotBuf)
    -> Result<(), GfxError>;

    // --- Timers (singly-linked list, prepended on create) ---

    /// Head of the timer list.
    fn first_timer(&self) -> Option<TimerHandle>;

    /// Successor of a timer in the list, `None` at the tail or for a stale
    /// handle.
    fn next_timer(&self, timer: TimerHandle) -> Option<TimerHandle>;

    /// Create a timer, prepending it to the list.
    fn create_timer(
        &mut self,
        callback: CallbackToken,
        user_data: UserToken,
        period_ms: u32,
    ) -> TimerHandle;

    /// Live identity attributes of a timer, `None` if the handle is stale.
    fn timer_identity(&self, timer: TimerHandle) -> Option<TimerIdentity>;

    /// Delete a timer. Fails on a stale handle.
    fn delete_timer(&mut self, timer: TimerHandle) -> Result<(), GfxError>;

    // --- Animations (singly-linked list, prepended on create) ---

    /// Head of the animation list.
    fn first_anim(&self) -> Option<AnimHandle>;

    /// Successor of an animation in the list.
    fn next_anim(&self, anim: AnimHandle) -> Option<AnimHandle>;

    /// Start an animation, prepending it to the list.
    fn start_anim(&mut self, var: UserToken, exec: CallbackToken) -> AnimHandle;

    /// Live identity attributes of an animation.
    fn anim_identity(&self, anim: AnimHandle) -> Option<AnimIdentity>;

    /// Delete the animation matching (var, exec), the way the kernel's own
    /// delete primitive addresses animations. Returns whether one was
    /// deleted.
    fn delete_anim(&mut self, var: UserToken, exec: CallbackToken) -> bool;

    // --- Display ---

    /// Reported display resolution.
    fn resolution(&self) -> Size;

    /// Override the reported display resolution.
    ///
    /// Used to temporarily shrink the coordinate space while an app lays out
    /// inside a visual sub-area.
    fn set_resolution(&mut self, size: Size);

    /// The active display theme.
    fn theme(&self) -> Option<Theme>;

    /// Set the active display theme.
    fn set_theme(&mut self, theme: Theme);

    // --- Events ---

    /// Drain queued kernel events in emission order.
    fn take_events(&mut self) -> Vec<GfxEvent>;
}
