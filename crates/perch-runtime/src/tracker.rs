#![forbid(unsafe_code)]

//! Differential resource tracking.
//!
//! The kernel allocates screens, timers, and animations in pools perch does
//! not own, with no creation callback to hook. The only reliable way to know
//! what an app created is to snapshot the pool positions before its hook
//! runs and diff afterwards: new screens appear past the remembered array
//! index, new timers/animations between the current list head and the
//! remembered head (the kernel prepends).
//!
//! A handle alone is not proof of identity — slots are reused after
//! deletion — so every recorded handle carries the object's secondary
//! attributes, and cleanup deletes a handle only while the live attributes
//! still match. Anything else is skipped: the slot belongs to someone else
//! now.
//!
//! Walks over the foreign lists are bounded by [`TrackerConfig::loop_limit`]
//! as a circuit breaker against corrupted or cyclic lists. The three kinds
//! are independent failure domains: a failed walk discards that kind's
//! records and the operation continues for the others.

use std::collections::HashMap;

use perch_gfx::{
    AnimHandle, AnimIdentity, GfxDevice, ResourceKind, ScreenHandle, ScreenIdentity, TimerHandle,
    TimerIdentity,
};
use tracing::{debug, error, warn};

/// Tuning knobs for the tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Upper bound on any single walk over a kernel list.
    ///
    /// A heuristic circuit breaker, not a correctness boundary; exceeding it
    /// discards the affected kind's records and is reported, never escalated.
    pub loop_limit: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { loop_limit: 1000 }
    }
}

/// Snapshot-based recorder of kernel objects created inside an interval.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    config: TrackerConfig,
    recording: bool,

    // Position markers captured at start-of-recording.
    screen_base: usize,
    head_timer: Option<TimerHandle>,
    head_anim: Option<AnimHandle>,

    // Tracked handles in discovery order, plus their recorded identities.
    screens: Vec<ScreenHandle>,
    screen_ids: HashMap<ScreenHandle, ScreenIdentity>,
    timers: Vec<TimerHandle>,
    timer_ids: HashMap<TimerHandle, TimerIdentity>,
    anims: Vec<AnimHandle>,
    anim_ids: HashMap<AnimHandle, AnimIdentity>,
}

impl ResourceTracker {
    /// Create a tracker with the given configuration.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Whether a recording interval is open.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Whether nothing is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.screens.is_empty() && self.timers.is_empty() && self.anims.is_empty()
    }

    /// Tracked screens in discovery order.
    pub fn screens(&self) -> &[ScreenHandle] {
        &self.screens
    }

    /// Whether the given screen is tracked.
    pub fn tracks_screen(&self, screen: ScreenHandle) -> bool {
        self.screens.contains(&screen)
    }

    /// Number of tracked screens.
    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    /// Number of tracked timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Number of tracked animations.
    pub fn anim_count(&self) -> usize {
        self.anims.len()
    }

    /// Capture position markers for all three kinds.
    ///
    /// Calling while already recording is a soft no-op, so a nested bracket
    /// cannot clobber the markers of the outer one.
    pub fn start(&mut self, dev: &dyn GfxDevice) {
        if self.recording {
            debug!("recording already started, ignoring");
            return;
        }
        self.screen_base = dev.screen_count();
        self.head_timer = dev.first_timer();
        self.head_anim = dev.first_anim();
        self.recording = true;
        debug!(
            screen_base = self.screen_base,
            head_timer = ?self.head_timer,
            head_anim = ?self.head_anim,
            "recording started"
        );
    }

    /// Walk from the current pool positions back to the markers, recording
    /// every newly seen handle and its identity attributes.
    ///
    /// Returns `true` when every kind was recorded intact. A kind whose walk
    /// overruns the loop limit or never reaches its marker is discarded
    /// wholesale and `false` is returned; the other kinds are unaffected.
    /// Calling without an open interval is a soft no-op returning `true`.
    pub fn stop(&mut self, dev: &dyn GfxDevice) -> bool {
        if !self.recording {
            debug!("recording not started, ignoring stop");
            return true;
        }
        self.recording = false;

        let mut intact = true;

        // Screens: everything past the remembered array index is new.
        if dev.screen_count() < self.screen_base {
            error!(
                kind = %ResourceKind::Screen,
                base = self.screen_base,
                count = dev.screen_count(),
                "screen array shrank below marker, discarding records"
            );
            self.discard_screens();
            intact = false;
        } else {
            let mut loops = 0u32;
            let mut overflow = false;
            for index in self.screen_base..dev.screen_count() {
                if loops >= self.config.loop_limit {
                    overflow = true;
                    break;
                }
                loops += 1;
                let Some(screen) = dev.screen_at(index) else {
                    break;
                };
                let Some(identity) = dev.screen_identity(screen) else {
                    continue;
                };
                // Update the identity even for already-tracked handles; the
                // latest attributes are the ones cleanup must verify.
                self.screen_ids.insert(screen, identity);
                if !self.screens.contains(&screen) {
                    self.screens.push(screen);
                } else {
                    debug!(?screen, "screen already recorded");
                }
            }
            if overflow {
                error!(kind = %ResourceKind::Screen, "record walk exceeded loop limit");
                self.discard_screens();
                intact = false;
            } else {
                debug!(count = self.screens.len(), "screens recorded");
            }
        }

        // Timers: walk from the current head down to the remembered head.
        if !self.record_timer_list(dev) {
            intact = false;
        }

        // Animations: same shape as timers.
        if !self.record_anim_list(dev) {
            intact = false;
        }

        intact
    }

    /// Delete every tracked object whose live identity still matches its
    /// recorded attributes, then clear all tracking state.
    ///
    /// Mismatched handles are skipped — the slot was reused by unrelated
    /// code — and logged. Deletion mutates the foreign pools, so each
    /// successful delete restarts that kind's scan from the top. Returns
    /// `false` if any kind overran the loop limit; matched handles are still
    /// deleted best-effort and the state is reset regardless.
    pub fn cleanup(&mut self, dev: &mut dyn GfxDevice) -> bool {
        let mut ok = true;

        // Screens
        let mut loops = 0u32;
        let mut index = 0usize;
        let mut cleaned = 0usize;
        let tracked = self.screens.len();
        while index < dev.screen_count() && !self.screens.is_empty() {
            if loops >= self.config.loop_limit {
                error!(kind = %ResourceKind::Screen, "cleanup walk exceeded loop limit");
                ok = false;
                break;
            }
            loops += 1;
            let Some(screen) = dev.screen_at(index) else {
                break;
            };
            let mut deleted = false;
            if let Some(pos) = self.screens.iter().position(|&s| s == screen) {
                match self.screen_ids.get(&screen) {
                    Some(&recorded) if dev.screen_identity(screen) == Some(recorded) => {
                        if dev.delete_screen(screen).is_ok() {
                            deleted = true;
                            cleaned += 1;
                        } else {
                            error!(?screen, "screen delete failed");
                        }
                    }
                    Some(_) => {
                        warn!(?screen, "screen identity mismatch, skipping");
                    }
                    None => {
                        error!(?screen, "screen identity record missing");
                    }
                }
                self.screens.remove(pos);
                self.screen_ids.remove(&screen);
            }
            index = if deleted { 0 } else { index + 1 };
        }
        debug!(
            cleaned,
            missed = tracked.saturating_sub(cleaned),
            "screens cleaned"
        );

        // Timers
        let mut loops = 0u32;
        let mut cleaned = 0usize;
        let tracked = self.timers.len();
        let mut node = dev.first_timer();
        while let Some(timer) = node {
            if self.timers.is_empty() {
                break;
            }
            if loops >= self.config.loop_limit {
                error!(kind = %ResourceKind::Timer, "cleanup walk exceeded loop limit");
                ok = false;
                break;
            }
            loops += 1;
            let mut deleted = false;
            if let Some(pos) = self.timers.iter().position(|&t| t == timer) {
                match self.timer_ids.get(&timer) {
                    Some(&recorded) if dev.timer_identity(timer) == Some(recorded) => {
                        if dev.delete_timer(timer).is_ok() {
                            deleted = true;
                            cleaned += 1;
                        } else {
                            error!(?timer, "timer delete failed");
                        }
                    }
                    Some(_) => {
                        warn!(?timer, "timer identity mismatch, skipping");
                    }
                    None => {
                        error!(?timer, "timer identity record missing");
                    }
                }
                self.timers.remove(pos);
                self.timer_ids.remove(&timer);
            }
            node = if deleted {
                dev.first_timer()
            } else {
                dev.next_timer(timer)
            };
        }
        debug!(
            cleaned,
            missed = tracked.saturating_sub(cleaned),
            "timers cleaned"
        );

        // Animations
        let mut loops = 0u32;
        let mut cleaned = 0usize;
        let tracked = self.anims.len();
        let mut node = dev.first_anim();
        while let Some(anim) = node {
            if self.anims.is_empty() {
                break;
            }
            if loops >= self.config.loop_limit {
                error!(kind = %ResourceKind::Animation, "cleanup walk exceeded loop limit");
                ok = false;
                break;
            }
            loops += 1;
            let mut deleted = false;
            if let Some(pos) = self.anims.iter().position(|&a| a == anim) {
                match self.anim_ids.get(&anim) {
                    Some(&recorded) if dev.anim_identity(anim) == Some(recorded) => {
                        if dev.delete_anim(recorded.var, recorded.exec) {
                            deleted = true;
                            cleaned += 1;
                        } else {
                            error!(?anim, "animation delete failed");
                        }
                    }
                    Some(_) => {
                        warn!(?anim, "animation identity mismatch, skipping");
                    }
                    None => {
                        error!(?anim, "animation identity record missing");
                    }
                }
                self.anims.remove(pos);
                self.anim_ids.remove(&anim);
            }
            node = if deleted {
                dev.first_anim()
            } else {
                dev.next_anim(anim)
            };
        }
        debug!(
            cleaned,
            missed = tracked.saturating_sub(cleaned),
            "animations cleaned"
        );

        self.reset();
        ok
    }

    /// Unconditionally clear all tracking state without deleting anything.
    pub fn reset(&mut self) {
        self.screen_base = 0;
        self.head_timer = None;
        self.head_anim = None;
        self.discard_screens();
        self.timers.clear();
        self.timer_ids.clear();
        self.anims.clear();
        self.anim_ids.clear();
        self.recording = false;
    }

    fn discard_screens(&mut self) {
        self.screens.clear();
        self.screen_ids.clear();
    }

    fn record_timer_list(&mut self, dev: &dyn GfxDevice) -> bool {
        let mut loops = 0u32;
        let mut overflow = false;
        let mut node = dev.first_timer();
        while let Some(timer) = node {
            if Some(timer) == self.head_timer {
                break;
            }
            if loops >= self.config.loop_limit {
                overflow = true;
                break;
            }
            loops += 1;
            if let Some(id) = dev.timer_identity(timer) {
                self.timer_ids.insert(timer, id);
                if !self.timers.contains(&timer) {
                    self.timers.push(timer);
                } else {
                    debug!(?timer, "timer already recorded");
                }
            }
            node = dev.next_timer(timer);
        }
        if overflow || (node.is_none() && self.head_timer.is_some()) {
            error!(kind = %ResourceKind::Timer, "record walk failed, discarding records");
            self.timers.clear();
            self.timer_ids.clear();
            return false;
        }
        debug!(count = self.timers.len(), "timers recorded");
        true
    }

    fn record_anim_list(&mut self, dev: &dyn GfxDevice) -> bool {
        let mut loops = 0u32;
        let mut overflow = false;
        let mut node = dev.first_anim();
        while let Some(anim) = node {
            if Some(anim) == self.head_anim {
                break;
            }
            if loops >= self.config.loop_limit {
                overflow = true;
                break;
            }
            loops += 1;
            if let Some(id) = dev.anim_identity(anim) {
                self.anim_ids.insert(anim, id);
                if !self.anims.contains(&anim) {
                    self.anims.push(anim);
                } else {
                    debug!(?anim, "animation already recorded");
                }
            }
            node = dev.next_anim(anim);
        }
        if overflow || (node.is_none() && self.head_anim.is_some()) {
            error!(kind = %ResourceKind::Animation, "record walk failed, discarding records");
            self.anims.clear();
            self.anim_ids.clear();
            return false;
        }
        debug!(count = self.anims.len(), "animations recorded");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::geometry::Size;
    use perch_gfx::{CallbackToken, ClassId, SimDevice, UserToken};

    fn device() -> SimDevice {
        SimDevice::new(Size::new(480, 480))
    }

    #[test]
    fn start_is_idempotent() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        tracker.start(&dev);
        let head_before = dev.first_timer();

        // A second start inside the interval must not move the markers.
        dev.create_timer(CallbackToken(2), UserToken::NONE, 100);
        tracker.start(&dev);

        assert!(tracker.stop(&dev));
        assert_eq!(tracker.timer_count(), 1);
        assert_ne!(dev.first_timer(), head_before);
    }

    #[test]
    fn stop_without_start_is_noop() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();
        dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        assert!(tracker.stop(&dev));
        assert!(tracker.is_empty());
    }

    #[test]
    fn records_only_objects_created_inside_interval() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        let outside_screen = dev.create_screen(ClassId::OBJECT);
        let outside_timer = dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        dev.start_anim(UserToken(1), CallbackToken(1));

        tracker.start(&dev);
        let s = dev.create_screen(ClassId::OBJECT);
        let t1 = dev.create_timer(CallbackToken(2), UserToken::NONE, 50);
        let t2 = dev.create_timer(CallbackToken(3), UserToken::NONE, 50);
        dev.start_anim(UserToken(2), CallbackToken(2));
        assert!(tracker.stop(&dev));

        assert_eq!(tracker.screen_count(), 1);
        assert_eq!(tracker.timer_count(), 2);
        assert_eq!(tracker.anim_count(), 1);
        assert!(tracker.tracks_screen(s));
        assert!(!tracker.tracks_screen(outside_screen));

        assert!(tracker.cleanup(&mut dev));

        // Exactly the interval's objects are gone.
        assert_eq!(dev.screen_count(), 1);
        assert_eq!(dev.screen_at(0), Some(outside_screen));
        assert_eq!(dev.first_timer(), Some(outside_timer));
        assert_eq!(dev.timer_count(), 1);
        assert_eq!(dev.anim_count(), 1);
        assert!(tracker.is_empty());
        assert_eq!(
            dev.timer_identity(t1).is_none() && dev.timer_identity(t2).is_none(),
            true
        );
    }

    #[test]
    fn cleanup_skips_reused_slot_with_different_identity() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        tracker.start(&dev);
        let t = dev.create_timer(CallbackToken(10), UserToken(1), 100);
        assert!(tracker.stop(&dev));

        // The app's timer dies early and unrelated code reuses the slot.
        dev.delete_timer(t).unwrap();
        let reused = dev.create_timer(CallbackToken(99), UserToken(2), 100);
        assert_eq!(reused, t, "sim must reuse the slot for this test");

        assert!(tracker.cleanup(&mut dev));
        assert_eq!(dev.timer_count(), 1, "new occupant must survive");
        assert_eq!(
            dev.timer_identity(reused),
            Some(perch_gfx::TimerIdentity {
                callback: CallbackToken(99),
                user_data: UserToken(2),
            })
        );
    }

    #[test]
    fn cleanup_skips_reused_screen_slot() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        tracker.start(&dev);
        let s = dev.create_screen(ClassId::OBJECT);
        assert!(tracker.stop(&dev));

        dev.delete_screen(s).unwrap();
        let reused = dev.create_screen(ClassId(7));
        assert_eq!(reused, s);

        assert!(tracker.cleanup(&mut dev));
        assert_eq!(dev.screen_count(), 1);
        assert_eq!(
            dev.screen_identity(reused).map(|i| i.class),
            Some(ClassId(7))
        );
    }

    #[test]
    fn vanished_head_marker_discards_only_that_kind() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        let head = dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        tracker.start(&dev);
        dev.create_timer(CallbackToken(2), UserToken::NONE, 100);
        let s = dev.create_screen(ClassId::OBJECT);

        // The remembered timer head disappears inside the interval, so the
        // stop walk can never terminate at it.
        dev.delete_timer(head).unwrap();

        assert!(!tracker.stop(&dev));
        assert_eq!(tracker.timer_count(), 0, "timer records discarded");
        assert_eq!(tracker.screen_count(), 1, "screens unaffected");
        assert!(tracker.tracks_screen(s));
    }

    #[test]
    fn loop_limit_discards_kind_on_stop() {
        let mut dev = device();
        let mut tracker = ResourceTracker::new(TrackerConfig { loop_limit: 3 });

        tracker.start(&dev);
        for i in 0..5 {
            dev.create_timer(CallbackToken(i), UserToken::NONE, 100);
        }
        assert!(!tracker.stop(&dev));
        assert_eq!(tracker.timer_count(), 0);
    }

    #[test]
    fn cleanup_reports_false_on_loop_limit_but_resets() {
        let mut dev = device();
        let mut tracker = ResourceTracker::new(TrackerConfig { loop_limit: 4 });

        tracker.start(&dev);
        for i in 0..2 {
            dev.create_timer(CallbackToken(i), UserToken::NONE, 100);
        }
        assert!(tracker.stop(&dev));

        // Unrelated timers prepend in front of the tracked ones, so every
        // restart-from-head after a delete re-scans them; four steps are not
        // enough to reach the second tracked timer.
        for i in 0..3 {
            dev.create_timer(CallbackToken(100 + i), UserToken::NONE, 100);
        }

        assert!(!tracker.cleanup(&mut dev));
        assert!(tracker.is_empty(), "state must reset even on failure");
        assert_eq!(dev.timer_count(), 4, "one tracked timer was left behind");
    }

    #[test]
    fn reset_clears_without_deleting() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        tracker.start(&dev);
        dev.create_screen(ClassId::OBJECT);
        dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        assert!(tracker.stop(&dev));

        tracker.reset();
        assert!(tracker.is_empty());
        assert!(!tracker.is_recording());
        assert_eq!(dev.screen_count(), 1);
        assert_eq!(dev.timer_count(), 1);
    }

    #[test]
    fn double_interval_accumulates_records() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();

        tracker.start(&dev);
        dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        assert!(tracker.stop(&dev));

        tracker.start(&dev);
        dev.create_timer(CallbackToken(2), UserToken::NONE, 100);
        assert!(tracker.stop(&dev));

        assert_eq!(tracker.timer_count(), 2);
        assert!(tracker.cleanup(&mut dev));
        assert_eq!(dev.timer_count(), 0);
    }

    #[test]
    fn cleanup_with_nothing_tracked_is_ok() {
        let mut dev = device();
        let mut tracker = ResourceTracker::default();
        dev.create_timer(CallbackToken(1), UserToken::NONE, 100);
        assert!(tracker.cleanup(&mut dev));
        assert_eq!(dev.timer_count(), 1);
    }
}
