#![forbid(unsafe_code)]

//! Navigation bar state.
//!
//! Three soft buttons at the bottom of the screen. A press posts the
//! matching navigation request; the manager decides what it means.

use perch_core::geometry::{Area, Size};
use perch_runtime::{NavigateKind, SystemEvent, SystemEventQueue};
use tracing::debug;

/// A navigation bar button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavButton {
    /// Back to the previous view.
    Back,
    /// Home screen.
    Home,
    /// Recents overview.
    Recents,
}

/// Navigation bar configuration.
#[derive(Debug, Clone, Copy)]
pub struct NavigationBarData {
    /// Height of the strip in pixels.
    pub height: i32,
}

impl Default for NavigationBarData {
    fn default() -> Self {
        Self { height: 48 }
    }
}

/// The navigation bar.
#[derive(Debug)]
pub struct NavigationBar {
    data: NavigationBarData,
    queue: SystemEventQueue,
    visible: bool,
}

impl NavigationBar {
    /// Create a navigation bar posting into the given queue.
    pub fn new(data: NavigationBarData, queue: SystemEventQueue) -> Self {
        Self {
            data,
            queue,
            visible: true,
        }
    }

    /// The strip this bar occupies on the given screen.
    pub fn area(&self, screen: Size) -> Area {
        Area::new(
            0,
            screen.height - self.data.height,
            screen.width - 1,
            screen.height - 1,
        )
    }

    /// Show or hide the bar. A hidden bar ignores presses.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Whether the bar is shown.
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// A button was pressed. Returns whether a request was posted.
    pub fn press(&self, button: NavButton) -> bool {
        if !self.visible {
            return false;
        }
        let kind = match button {
            NavButton::Back => NavigateKind::Back,
            NavButton::Home => NavigateKind::Home,
            NavButton::Recents => NavigateKind::Recents,
        };
        debug!(?button, "navigation bar press");
        self.queue.post(SystemEvent::Navigate(kind));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_posts_matching_navigate_event() {
        let queue = SystemEventQueue::new();
        let bar = NavigationBar::new(NavigationBarData::default(), queue.clone());
        assert!(bar.press(NavButton::Back));
        assert!(bar.press(NavButton::Home));
        assert!(bar.press(NavButton::Recents));
        assert_eq!(
            queue.drain(),
            vec![
                SystemEvent::Navigate(NavigateKind::Back),
                SystemEvent::Navigate(NavigateKind::Home),
                SystemEvent::Navigate(NavigateKind::Recents),
            ]
        );
    }

    #[test]
    fn hidden_bar_ignores_presses() {
        let queue = SystemEventQueue::new();
        let mut bar = NavigationBar::new(NavigationBarData::default(), queue.clone());
        bar.set_visible(false);
        assert!(!bar.press(NavButton::Home));
        assert!(queue.is_empty());
    }

    #[test]
    fn area_spans_the_bottom_strip() {
        let queue = SystemEventQueue::new();
        let bar = NavigationBar::new(NavigationBarData { height: 48 }, queue);
        assert_eq!(
            bar.area(Size::new(480, 800)),
            Area::new(0, 752, 479, 799)
        );
    }
}
