#![forbid(unsafe_code)]

//! Status bar state.
//!
//! The strip of chrome at the top of the screen: clock, battery, wifi.
//! Icon layout and styling are the host's business; this type keeps the
//! displayed values consistent and clamped.

use perch_core::geometry::{Area, Size};
use tracing::debug;

/// Wifi signal strength bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WifiLevel {
    /// Radio off or out of range.
    #[default]
    Off,
    /// One bar.
    Weak,
    /// Two bars.
    Fair,
    /// Three bars.
    Good,
}

/// Status bar configuration.
#[derive(Debug, Clone, Copy)]
pub struct StatusBarData {
    /// Height of the strip in pixels.
    pub height: i32,
    /// 24-hour clock when set, 12-hour otherwise.
    pub use_24h: bool,
}

impl Default for StatusBarData {
    fn default() -> Self {
        Self {
            height: 40,
            use_24h: true,
        }
    }
}

/// The status bar.
#[derive(Debug)]
pub struct StatusBar {
    data: StatusBarData,
    visible: bool,
    hour: u8,
    minute: u8,
    battery_percent: u8,
    charging: bool,
    wifi: WifiLevel,
}

impl StatusBar {
    /// Create a status bar from its configuration.
    pub fn new(data: StatusBarData) -> Self {
        Self {
            data,
            visible: true,
            hour: 0,
            minute: 0,
            battery_percent: 100,
            charging: false,
            wifi: WifiLevel::Off,
        }
    }

    /// The strip this bar occupies on the given screen.
    pub fn area(&self, screen: Size) -> Area {
        Area::new(0, 0, screen.width - 1, self.data.height - 1)
    }

    /// Show or hide the bar.
    pub fn set_visible(&mut self, visible: bool) {
        debug!(visible, "status bar visibility");
        self.visible = visible;
    }

    /// Whether the bar is shown.
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Set the clock. Out-of-range values are clamped.
    pub fn set_clock(&mut self, hour: u8, minute: u8) {
        self.hour = hour.min(23);
        self.minute = minute.min(59);
    }

    /// The clock text in the configured format.
    pub fn clock_label(&self) -> String {
        if self.data.use_24h {
            format!("{:02}:{:02}", self.hour, self.minute)
        } else {
            let (hour, suffix) = match self.hour {
                0 => (12, "AM"),
                1..=11 => (self.hour, "AM"),
                12 => (12, "PM"),
                _ => (self.hour - 12, "PM"),
            };
            format!("{:02}:{:02} {}", hour, self.minute, suffix)
        }
    }

    /// Set battery state. Percent is clamped to 100.
    pub fn set_battery(&mut self, percent: u8, charging: bool) {
        self.battery_percent = percent.min(100);
        self.charging = charging;
    }

    /// Battery fill percent.
    pub fn battery_percent(&self) -> u8 {
        self.battery_percent
    }

    /// Whether a charger is attached.
    pub fn charging(&self) -> bool {
        self.charging
    }

    /// Set the wifi strength bucket.
    pub fn set_wifi(&mut self, level: WifiLevel) {
        self.wifi = level;
    }

    /// Current wifi strength bucket.
    pub fn wifi(&self) -> WifiLevel {
        self.wifi
    }
}
