#![forbid(unsafe_code)]

//! Perch Widgets
//!
//! Behavior-level shell chrome: status bar, navigation bar, app launcher,
//! recents screen, and the gesture recognizer. These widgets own state and
//! event wiring, not pixels — what they actually draw belongs to the host's
//! rendering layer. They talk to the rest of the system by posting
//! [`SystemEvent`](perch_runtime::SystemEvent)s (launcher taps, recents
//! dismissals, navigation) and by consuming the manager's running-app list
//! and snapshots.

pub mod app_launcher;
pub mod gesture;
pub mod navigation_bar;
pub mod recents_screen;
pub mod status_bar;

pub use app_launcher::{AppLauncher, LauncherError, LauncherIcon};
pub use gesture::{Gesture, GestureData, GestureDirection, GestureInfo, GestureZone};
pub use navigation_bar::{NavButton, NavigationBar, NavigationBarData};
pub use recents_screen::{RecentsScreen, RecentsSnapshot};
pub use status_bar::{StatusBar, StatusBarData, WifiLevel};
