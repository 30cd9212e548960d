#![forbid(unsafe_code)]

//! In-memory simulated graphics kernel.
//!
//! [`SimDevice`] implements [`GfxDevice`] with the same pool shapes as the
//! real kernel: an append-ordered screen array and prepend-ordered timer and
//! animation lists. Slots are allocated lowest-free-first, so deleting an
//! object and creating another of the same kind reuses the handle — exactly
//! the hazard the identity attributes exist to catch.
//!
//! Screen loads come in two flavors: [`GfxDevice::load_screen`] commits
//! immediately and queues the unload/load event pair, while
//! [`GfxDevice::load_screen_animated`] parks the target in `pending_screen`
//! until [`SimDevice::complete_load`] is called, modeling a transition that
//! finishes on a later kernel tick.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::device::{GfxDevice, GfxEvent, SnapshotBuf};
use crate::handle::{
    AnimHandle, AnimIdentity, CallbackToken, ClassId, GfxError, ResourceKind, ScreenHandle,
    ScreenIdentity, Theme, TimerHandle, TimerIdentity, UserToken,
};
use perch_core::geometry::{Point, Size};

/// Per-kind slot allocator with lowest-free-first reuse.
#[derive(Debug, Default)]
struct SlotAlloc {
    next: u32,
    free: BTreeSet<u32>,
}

impl SlotAlloc {
    fn alloc(&mut self) -> u32 {
        if let Some(&slot) = self.free.iter().next() {
            self.free.remove(&slot);
            return slot;
        }
        let slot = self.next;
        self.next += 1;
        slot
    }

    fn release(&mut self, slot: u32) {
        self.free.insert(slot);
    }
}

#[derive(Debug, Clone)]
struct ScreenRec {
    identity: ScreenIdentity,
    pos: Point,
}

#[derive(Debug, Clone)]
struct TimerRec {
    identity: TimerIdentity,
    #[allow(dead_code)]
    period_ms: u32,
    next: Option<TimerHandle>,
}

#[derive(Debug, Clone)]
struct AnimRec {
    identity: AnimIdentity,
    next: Option<AnimHandle>,
}

/// The simulated kernel.
#[derive(Debug)]
pub struct SimDevice {
    resolution: Size,
    theme: Option<Theme>,

    screens: Vec<ScreenHandle>,
    screen_recs: HashMap<u32, ScreenRec>,
    screen_slots: SlotAlloc,

    timer_head: Option<TimerHandle>,
    timer_recs: HashMap<u32, TimerRec>,
    timer_slots: SlotAlloc,

    anim_head: Option<AnimHandle>,
    anim_recs: HashMap<u32, AnimRec>,
    anim_slots: SlotAlloc,

    active: Option<ScreenHandle>,
    pending: Option<ScreenHandle>,
    events: VecDeque<GfxEvent>,
}

impl SimDevice {
    /// Create a simulated kernel with the given display resolution.
    pub fn new(resolution: Size) -> Self {
        Self {
            resolution,
            theme: Some(Theme(0)),
            screens: Vec::new(),
            screen_recs: HashMap::new(),
            screen_slots: SlotAlloc::default(),
            timer_head: None,
            timer_recs: HashMap::new(),
            timer_slots: SlotAlloc::default(),
            anim_head: None,
            anim_recs: HashMap::new(),
            anim_slots: SlotAlloc::default(),
            active: None,
            pending: None,
            events: VecDeque::new(),
        }
    }

    /// Commit a pending animated screen load.
    ///
    /// No-op when no transition is in flight. Queues the unload event for
    /// the outgoing screen before the load event for the incoming one.
    pub fn complete_load(&mut self) {
        let Some(next) = self.pending.take() else {
            return;
        };
        if let Some(old) = self.active
            && old != next
        {
            self.events.push_back(GfxEvent::ScreenUnloaded(old));
        }
        self.active = Some(next);
        self.events.push_back(GfxEvent::ScreenLoaded(next));
    }

    /// Number of live timers (test helper; walks the list).
    pub fn timer_count(&self) -> usize {
        let mut count = 0;
        let mut node = self.timer_head;
        while let Some(t) = node {
            count += 1;
            node = self.next_timer(t);
        }
        count
    }

    /// Number of live animations (test helper; walks the list).
    pub fn anim_count(&self) -> usize {
        let mut count = 0;
        let mut node = self.anim_head;
        while let Some(a) = node {
            count += 1;
            node = self.next_anim(a);
        }
        count
    }

    /// Position of a screen (test helper).
    pub fn screen_pos(&self, screen: ScreenHandle) -> Option<Point> {
        self.screen_recs.get(&screen.0).map(|r| r.pos)
    }
}

impl GfxDevice for SimDevice {
    fn screen_count(&self) -> usize {
        self.screens.len()
    }

    fn screen_at(&self, index: usize) -> Option<ScreenHandle> {
        self.screens.get(index).copied()
    }

    fn create_screen(&mut self, class: ClassId) -> ScreenHandle {
        let handle = ScreenHandle(self.screen_slots.alloc());
        self.screen_recs.insert(
            handle.0,
            ScreenRec {
                identity: ScreenIdentity {
                    class,
                    parent: None,
                },
                pos: Point::default(),
            },
        );
        self.screens.push(handle);
        handle
    }

    fn screen_identity(&self, screen: ScreenHandle) -> Option<ScreenIdentity> {
        self.screen_recs.get(&screen.0).map(|r| r.identity)
    }

    fn delete_screen(&mut self, screen: ScreenHandle) -> Result<(), GfxError> {
        if self.screen_recs.remove(&screen.0).is_none() {
            return Err(GfxError::Stale {
                kind: ResourceKind::Screen,
                slot: screen.0,
            });
        }
        self.screens.retain(|&s| s != screen);
        self.screen_slots.release(screen.0);
        if self.active == Some(screen) {
            self.active = None;
        }
        if self.pending == Some(screen) {
            self.pending = None;
        }
        Ok(())
    }

    fn set_screen_pos(&mut self, screen: ScreenHandle, pos: Point) -> Result<(), GfxError> {
        match self.screen_recs.get_mut(&screen.0) {
            Some(rec) => {
                rec.pos = pos;
                Ok(())
            }
            None => Err(GfxError::Stale {
                kind: ResourceKind::Screen,
                slot: screen.0,
            }),
        }
    }

    fn active_screen(&self) -> Option<ScreenHandle> {
        self.active
    }

    fn pending_screen(&self) -> Option<ScreenHandle> {
        self.pending
    }

    fn load_screen(&mut self, screen: ScreenHandle) -> Result<(), GfxError> {
        if !self.screen_recs.contains_key(&screen.0) {
            return Err(GfxError::Stale {
                kind: ResourceKind::Screen,
                slot: screen.0,
            });
        }
        self.pending = None;
        if self.active == Some(screen) {
            return Ok(());
        }
        if let Some(old) = self.active {
            self.events.push_back(GfxEvent::ScreenUnloaded(old));
        }
        self.active = Some(screen);
        self.events.push_back(GfxEvent::ScreenLoaded(screen));
        Ok(())
    }

    fn load_screen_animated(&mut self, screen: ScreenHandle) -> Result<(), GfxError> {
        if !self.screen_recs.contains_key(&screen.0) {
            return Err(GfxError::Stale {
                kind: ResourceKind::Screen,
                slot: screen.0,
            });
        }
        self.pending = Some(screen);
        Ok(())
    }

    fn snapshot_screen(
        &self,
        screen: ScreenHandle,
        buf: &mut SnapshotBuf,
    ) -> Result<(), GfxError> {
        if !self.screen_recs.contains_key(&screen.0) {
            return Err(GfxError::Stale {
                kind: ResourceKind::Screen,
                slot: screen.0,
            });
        }
        let fill = (screen.0 & 0xff) as u8;
        buf.data_mut().fill(fill);
        Ok(())
    }

    fn first_timer(&self) -> Option<TimerHandle> {
        self.timer_head
    }

    fn next_timer(&self, timer: TimerHandle) -> Option<TimerHandle> {
        self.timer_recs.get(&timer.0).and_then(|r| r.next)
    }

    fn create_timer(
        &mut self,
        callback: CallbackToken,
        user_data: UserToken,
        period_ms: u32,
    ) -> TimerHandle {
        let handle = TimerHandle(self.timer_slots.alloc());
        self.timer_recs.insert(
            handle.0,
            TimerRec {
                identity: TimerIdentity {
                    callback,
                    user_data,
                },
                period_ms,
                next: self.timer_head,
            },
        );
        self.timer_head = Some(handle);
        handle
    }

    fn timer_identity(&self, timer: TimerHandle) -> Option<TimerIdentity> {
        self.timer_recs.get(&timer.0).map(|r| r.identity)
    }

    fn delete_timer(&mut self, timer: TimerHandle) -> Result<(), GfxError> {
        let Some(rec) = self.timer_recs.remove(&timer.0) else {
            return Err(GfxError::Stale {
                kind: ResourceKind::Timer,
                slot: timer.0,
            });
        };
        // Unlink from the singly-linked list.
        if self.timer_head == Some(timer) {
            self.timer_head = rec.next;
        } else {
            let mut node = self.timer_head;
            while let Some(t) = node {
                let entry = self.timer_recs.get_mut(&t.0);
                match entry {
                    Some(e) if e.next == Some(timer) => {
                        e.next = rec.next;
                        break;
                    }
                    Some(e) => node = e.next,
                    None => break,
                }
            }
        }
        self.timer_slots.release(timer.0);
        Ok(())
    }

    fn first_anim(&self) -> Option<AnimHandle> {
        self.anim_head
    }

    fn next_anim(&self, anim: AnimHandle) -> Option<AnimHandle> {
        self.anim_recs.get(&anim.0).and_then(|r| r.next)
    }

    fn start_anim(&mut self, var: UserToken, exec: CallbackToken) -> AnimHandle {
        let handle = AnimHandle(self.anim_slots.alloc());
        self.anim_recs.insert(
            handle.0,
            AnimRec {
                identity: AnimIdentity { var, exec },
                next: self.anim_head,
            },
        );
        self.anim_head = Some(handle);
        handle
    }

    fn anim_identity(&self, anim: AnimHandle) -> Option<AnimIdentity> {
        self.anim_recs.get(&anim.0).map(|r| r.identity)
    }

    fn delete_anim(&mut self, var: UserToken, exec: CallbackToken) -> bool {
        let mut node = self.anim_head;
        while let Some(a) = node {
            let Some(rec) = self.anim_recs.get(&a.0) else {
                return false;
            };
            if rec.identity.var == var && rec.identity.exec == exec {
                let next = rec.next;
                if self.anim_head == Some(a) {
                    self.anim_head = next;
                } else {
                    let mut prev = self.anim_head;
                    while let Some(p) = prev {
                        let entry = self.anim_recs.get_mut(&p.0);
                        match entry {
                            Some(e) if e.next == Some(a) => {
                                e.next = next;
                                break;
                            }
                            Some(e) => prev = e.next,
                            None => break,
                        }
                    }
                }
                self.anim_recs.remove(&a.0);
                self.anim_slots.release(a.0);
                return true;
            }
            node = rec.next;
        }
        false
    }

    fn resolution(&self) -> Size {
        self.resolution
    }

    fn set_resolution(&mut self, size: Size) {
        self.resolution = size;
    }

    fn theme(&self) -> Option<Theme> {
        self.theme
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = Some(theme);
    }

    fn take_events(&mut self) -> Vec<GfxEvent> {
        self.events.drain(..).collect()
    }
}
