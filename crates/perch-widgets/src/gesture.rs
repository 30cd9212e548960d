#![forbid(unsafe_code)]

//! Touch gesture recognition.
//!
//! Tracks one pointer from press to release and classifies the stroke:
//! dominant direction, the screen zone it started and ended in, and whether
//! it was a short flick. Strokes that start on an edge map to shell
//! navigation: bottom-edge swipe up goes home (or to recents when held),
//! side-edge swipes go back.
//!
//! All thresholds are configuration; nothing here draws.

use bitflags::bitflags;
use perch_core::geometry::{Point, Size};
use perch_runtime::{NavigateKind, SystemEvent, SystemEventQueue};
use tracing::debug;

/// Dominant stroke direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureDirection {
    /// Displacement below both thresholds.
    #[default]
    None,
    /// Mostly upward.
    Up,
    /// Mostly downward.
    Down,
    /// Mostly leftward.
    Left,
    /// Mostly rightward.
    Right,
}

bitflags! {
    /// Screen zones a stroke can touch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GestureZone: u8 {
        /// Within the edge threshold of the left border.
        const LEFT_EDGE = 1;
        /// Within the edge threshold of the right border.
        const RIGHT_EDGE = 1 << 1;
        /// Within the edge threshold of the top border.
        const TOP_EDGE = 1 << 2;
        /// Within the edge threshold of the bottom border.
        const BOTTOM_EDGE = 1 << 3;
    }
}

/// Gesture thresholds.
#[derive(Debug, Clone, Copy)]
pub struct GestureData {
    /// Minimum vertical displacement for an up/down classification.
    pub threshold_vertical: i32,
    /// Minimum horizontal displacement for a left/right classification.
    pub threshold_horizontal: i32,
    /// Width of the edge zones in pixels.
    pub threshold_edge: i32,
    /// Strokes at most this long count as short flicks.
    pub short_duration_ms: u32,
    /// Map edge strokes to navigation requests.
    pub enable_navigation: bool,
}

impl Default for GestureData {
    fn default() -> Self {
        Self {
            threshold_vertical: 50,
            threshold_horizontal: 50,
            threshold_edge: 20,
            short_duration_ms: 300,
            enable_navigation: true,
        }
    }
}

/// A classified stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureInfo {
    /// Dominant direction.
    pub direction: GestureDirection,
    /// Press position.
    pub start: Point,
    /// Current or release position.
    pub stop: Point,
    /// Zones the press position touched.
    pub start_zone: GestureZone,
    /// Zones the stop position touched.
    pub stop_zone: GestureZone,
    /// Stroke duration so far.
    pub duration_ms: u32,
    /// Whether the stroke finished within the short-flick window.
    pub short: bool,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    start: Point,
    start_ms: u32,
}

/// The gesture recognizer.
#[derive(Debug)]
pub struct Gesture {
    data: GestureData,
    screen: Size,
    queue: SystemEventQueue,
    active: Option<ActiveStroke>,
}

impl Gesture {
    /// Create a recognizer for the given screen size.
    pub fn new(data: GestureData, screen: Size, queue: SystemEventQueue) -> Self {
        Self {
            data,
            screen,
            queue,
            active: None,
        }
    }

    /// Whether a stroke is in progress.
    pub fn pressed(&self) -> bool {
        self.active.is_some()
    }

    /// Pointer went down.
    pub fn press(&mut self, at: Point, now_ms: u32) {
        self.active = Some(ActiveStroke {
            start: at,
            start_ms: now_ms,
        });
    }

    /// Pointer moved while down. Returns the stroke as classified so far.
    pub fn pressing(&self, at: Point, now_ms: u32) -> Option<GestureInfo> {
        let stroke = self.active?;
        Some(self.classify(stroke, at, now_ms))
    }

    /// Pointer went up. Classifies the stroke and, when navigation mapping
    /// is on, posts the matching request.
    pub fn release(&mut self, at: Point, now_ms: u32) -> Option<GestureInfo> {
        let stroke = self.active.take()?;
        let info = self.classify(stroke, at, now_ms);
        debug!(
            direction = ?info.direction,
            start_zone = ?info.start_zone,
            short = info.short,
            "gesture released"
        );
        if self.data.enable_navigation
            && let Some(kind) = Self::navigation_for(&info)
        {
            self.queue.post(SystemEvent::Navigate(kind));
        }
        Some(info)
    }

    /// Forget any stroke in progress.
    pub fn reset(&mut self) {
        self.active = None;
    }

    fn classify(&self, stroke: ActiveStroke, at: Point, now_ms: u32) -> GestureInfo {
        let dx = at.x - stroke.start.x;
        let dy = at.y - stroke.start.y;
        let direction = if dy.abs() >= dx.abs() {
            if dy <= -self.data.threshold_vertical {
                GestureDirection::Up
            } else if dy >= self.data.threshold_vertical {
                GestureDirection::Down
            } else {
                GestureDirection::None
            }
        } else if dx <= -self.data.threshold_horizontal {
            GestureDirection::Left
        } else if dx >= self.data.threshold_horizontal {
            GestureDirection::Right
        } else {
            GestureDirection::None
        };
        let duration_ms = now_ms.saturating_sub(stroke.start_ms);
        GestureInfo {
            direction,
            start: stroke.start,
            stop: at,
            start_zone: self.zone_of(stroke.start),
            stop_zone: self.zone_of(at),
            duration_ms,
            short: duration_ms <= self.data.short_duration_ms,
        }
    }

    fn zone_of(&self, p: Point) -> GestureZone {
        let mut zone = GestureZone::empty();
        if p.x <= self.data.threshold_edge {
            zone |= GestureZone::LEFT_EDGE;
        }
        if p.x >= self.screen.width - 1 - self.data.threshold_edge {
            zone |= GestureZone::RIGHT_EDGE;
        }
        if p.y <= self.data.threshold_edge {
            zone |= GestureZone::TOP_EDGE;
        }
        if p.y >= self.screen.height - 1 - self.data.threshold_edge {
            zone |= GestureZone::BOTTOM_EDGE;
        }
        zone
    }

    fn navigation_for(info: &GestureInfo) -> Option<NavigateKind> {
        if info.start_zone.contains(GestureZone::BOTTOM_EDGE)
            && info.direction == GestureDirection::Up
        {
            // A quick flick goes home; a held swipe opens the overview.
            return Some(if info.short {
                NavigateKind::Home
            } else {
                NavigateKind::Recents
            });
        }
        if info.start_zone.contains(GestureZone::LEFT_EDGE)
            && info.direction == GestureDirection::Right
        {
            return Some(NavigateKind::Back);
        }
        if info.start_zone.contains(GestureZone::RIGHT_EDGE)
            && info.direction == GestureDirection::Left
        {
            return Some(NavigateKind::Back);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(queue: SystemEventQueue) -> Gesture {
        Gesture::new(GestureData::default(), Size::new(480, 800), queue)
    }

    #[test]
    fn classifies_vertical_stroke() {
        let mut g = gesture(SystemEventQueue::new());
        g.press(Point::new(240, 600), 0);
        let info = g.pressing(Point::new(240, 500), 100).unwrap();
        assert_eq!(info.direction, GestureDirection::Up);
        assert_eq!(info.duration_ms, 100);
        let info = g.release(Point::new(240, 700), 200).unwrap();
        assert_eq!(info.direction, GestureDirection::Down);
        assert!(!g.pressed());
    }

    #[test]
    fn small_displacement_is_no_direction() {
        let mut g = gesture(SystemEventQueue::new());
        g.press(Point::new(240, 400), 0);
        let info = g.release(Point::new(250, 410), 50).unwrap();
        assert_eq!(info.direction, GestureDirection::None);
    }

    #[test]
    fn bottom_edge_flick_up_goes_home() {
        let queue = SystemEventQueue::new();
        let mut g = gesture(queue.clone());
        g.press(Point::new(240, 795), 0);
        g.release(Point::new(240, 600), 200).unwrap();
        assert_eq!(
            queue.drain(),
            vec![SystemEvent::Navigate(NavigateKind::Home)]
        );
    }

    #[test]
    fn bottom_edge_held_swipe_opens_recents() {
        let queue = SystemEventQueue::new();
        let mut g = gesture(queue.clone());
        g.press(Point::new(240, 795), 0);
        g.release(Point::new(240, 500), 900).unwrap();
        assert_eq!(
            queue.drain(),
            vec![SystemEvent::Navigate(NavigateKind::Recents)]
        );
    }

    #[test]
    fn side_edge_swipes_go_back() {
        let queue = SystemEventQueue::new();
        let mut g = gesture(queue.clone());
        g.press(Point::new(5, 400), 0);
        g.release(Point::new(200, 400), 100).unwrap();
        g.press(Point::new(475, 400), 200);
        g.release(Point::new(300, 400), 300).unwrap();
        assert_eq!(
            queue.drain(),
            vec![
                SystemEvent::Navigate(NavigateKind::Back),
                SystemEvent::Navigate(NavigateKind::Back),
            ]
        );
    }

    #[test]
    fn center_stroke_posts_nothing() {
        let queue = SystemEventQueue::new();
        let mut g = gesture(queue.clone());
        g.press(Point::new(240, 400), 0);
        g.release(Point::new(240, 200), 100).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn navigation_mapping_can_be_disabled() {
        let queue = SystemEventQueue::new();
        let mut g = Gesture::new(
            GestureData {
                enable_navigation: false,
                ..GestureData::default()
            },
            Size::new(480, 800),
            queue.clone(),
        );
        g.press(Point::new(240, 795), 0);
        g.release(Point::new(240, 600), 100).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn zones_detect_corners() {
        let mut g = gesture(SystemEventQueue::new());
        g.press(Point::new(0, 0), 0);
        let info = g.pressing(Point::new(0, 0), 0).unwrap();
        assert!(info.start_zone.contains(GestureZone::LEFT_EDGE));
        assert!(info.start_zone.contains(GestureZone::TOP_EDGE));
        assert!(!info.start_zone.contains(GestureZone::BOTTOM_EDGE));
    }

    #[test]
    fn release_without_press_is_none() {
        let mut g = gesture(SystemEventQueue::new());
        assert!(g.release(Point::new(0, 0), 0).is_none());
        assert!(g.pressing(Point::new(0, 0), 0).is_none());
    }
}
