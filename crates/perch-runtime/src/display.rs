#![forbid(unsafe_code)]

//! Display coordination.
//!
//! [`Display`] owns the main (home) screen and the chrome geometry: the
//! insets reserved for the status bar and the navigation bar. It computes
//! the visual area apps are allowed to render into and brings the main
//! screen back when the foreground app goes away. Everything visual beyond
//! that — what the chrome actually draws — lives in the widget layer.

use std::fmt;

use perch_core::geometry::{Area, Point, Size};
use perch_gfx::{ClassId, GfxError, ScreenHandle};
use tracing::{debug, warn};

use crate::app::AppId;
use crate::context::Context;

/// Display configuration: pixels reserved for fixed chrome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayData {
    /// Pixels reserved at the top (status bar).
    pub chrome_top: i32,
    /// Pixels reserved at the bottom (navigation bar).
    pub chrome_bottom: i32,
}

/// Display error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    /// The main screen has not been created yet.
    NotInitialized,
    /// A kernel operation failed.
    Gfx(GfxError),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::NotInitialized => write!(f, "display is not initialized"),
            DisplayError::Gfx(e) => write!(f, "display kernel operation failed: {e}"),
        }
    }
}

impl std::error::Error for DisplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DisplayError::Gfx(e) => Some(e),
            DisplayError::NotInitialized => None,
        }
    }
}

impl From<GfxError> for DisplayError {
    fn from(e: GfxError) -> Self {
        DisplayError::Gfx(e)
    }
}

/// Owner of the main screen and the chrome geometry.
#[derive(Debug)]
pub struct Display {
    data: DisplayData,
    main_screen: Option<ScreenHandle>,
}

impl Display {
    /// Object class used for the main screen.
    pub const MAIN_SCREEN_CLASS: ClassId = ClassId(2);

    /// Create a display from its configuration.
    pub fn new(data: DisplayData) -> Self {
        Self {
            data,
            main_screen: None,
        }
    }

    /// Clamp the chrome insets to the calibrated screen size.
    pub fn calibrate(&mut self, size: Size) {
        let max_inset = (size.height / 2).max(0);
        if self.data.chrome_top > max_inset || self.data.chrome_bottom > max_inset {
            warn!(
                top = self.data.chrome_top,
                bottom = self.data.chrome_bottom,
                "chrome insets exceed half the screen, clamping"
            );
        }
        self.data.chrome_top = self.data.chrome_top.clamp(0, max_inset);
        self.data.chrome_bottom = self.data.chrome_bottom.clamp(0, max_inset);
    }

    /// Create and load the main screen.
    pub fn begin(&mut self, ctx: &Context) -> Result<(), DisplayError> {
        let mut dev = ctx.device();
        let screen = dev.create_screen(Self::MAIN_SCREEN_CLASS);
        dev.load_screen(screen)?;
        self.main_screen = Some(screen);
        debug!(?screen, "main screen created");
        Ok(())
    }

    /// Tear down the main screen.
    pub fn del(&mut self, ctx: &Context) {
        if let Some(screen) = self.main_screen.take()
            && ctx.device().delete_screen(screen).is_err()
        {
            warn!(?screen, "main screen already gone");
        }
    }

    /// The chrome configuration.
    pub fn data(&self) -> DisplayData {
        self.data
    }

    /// The main screen, once created.
    pub fn main_screen(&self) -> Option<ScreenHandle> {
        self.main_screen
    }

    /// The region apps may render into: the screen minus chrome insets.
    pub fn app_visual_area(&self, ctx: &Context) -> Area {
        let size = ctx.display_size();
        Area::new(
            0,
            self.data.chrome_top,
            size.width - 1,
            size.height - 1 - self.data.chrome_bottom,
        )
    }

    /// Load the main screen, bringing the home view back.
    pub fn load_main_screen(&self, ctx: &Context) -> Result<(), DisplayError> {
        let screen = self.main_screen.ok_or(DisplayError::NotInitialized)?;
        ctx.device().load_screen(screen)?;
        // The main screen ignores visual-area shrinking; pin it at origin.
        ctx.device().set_screen_pos(screen, Point::new(0, 0))?;
        Ok(())
    }

    /// An app finished installing.
    pub fn process_app_install(&self, _ctx: &Context, id: AppId) -> Result<(), DisplayError> {
        if self.main_screen.is_none() {
            return Err(DisplayError::NotInitialized);
        }
        debug!(app_id = %id, "display registered app");
        Ok(())
    }

    /// An app is being uninstalled.
    pub fn process_app_uninstall(&self, _ctx: &Context, id: AppId) -> Result<(), DisplayError> {
        debug!(app_id = %id, "display released app");
        Ok(())
    }

    /// An app closed; restore the main screen when it was in front.
    pub fn process_app_close(&self, ctx: &Context, was_active: bool) -> Result<(), DisplayError> {
        if was_active {
            self.load_main_screen(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextData;
    use crate::manager::{ManagerData, ManagerFlags};
    use perch_core::geometry::SizeSpec;
    use perch_gfx::{GfxDevice, SimDevice};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup(data: DisplayData) -> (Context, Display) {
        let gfx: Rc<RefCell<dyn GfxDevice>> =
            Rc::new(RefCell::new(SimDevice::new(Size::new(480, 800))));
        let mut ctx = Context::new(
            ContextData {
                name: "test".into(),
                screen_size: SizeSpec::FULL,
                display: data,
                manager: ManagerData {
                    max_running: 0,
                    flags: ManagerFlags::empty(),
                },
            },
            gfx,
        );
        ctx.begin().unwrap();
        let mut display = Display::new(data);
        display.calibrate(ctx.display_size());
        (ctx, display)
    }

    #[test]
    fn begin_creates_and_loads_main_screen() {
        let (ctx, mut display) = setup(DisplayData::default());
        display.begin(&ctx).unwrap();
        let main = display.main_screen().unwrap();
        assert_eq!(ctx.device().active_screen(), Some(main));
    }

    #[test]
    fn visual_area_excludes_chrome() {
        let (ctx, display) = setup(DisplayData {
            chrome_top: 40,
            chrome_bottom: 60,
        });
        let area = display.app_visual_area(&ctx);
        assert_eq!(area, Area::new(0, 40, 479, 739));
    }

    #[test]
    fn calibrate_clamps_oversized_insets() {
        let (ctx, _display) = setup(DisplayData::default());
        let mut display = Display::new(DisplayData {
            chrome_top: 9000,
            chrome_bottom: -5,
        });
        display.calibrate(ctx.display_size());
        assert_eq!(display.data().chrome_top, 400);
        assert_eq!(display.data().chrome_bottom, 0);
    }

    #[test]
    fn load_main_screen_requires_begin() {
        let (ctx, display) = setup(DisplayData::default());
        assert_eq!(
            display.load_main_screen(&ctx).unwrap_err(),
            DisplayError::NotInitialized
        );
    }

    #[test]
    fn process_app_close_restores_main_only_when_active() {
        let (ctx, mut display) = setup(DisplayData::default());
        display.begin(&ctx).unwrap();
        let other = ctx.device().create_screen(ClassId::OBJECT);
        ctx.device().load_screen(other).unwrap();

        display.process_app_close(&ctx, false).unwrap();
        assert_eq!(ctx.device().active_screen(), Some(other));

        display.process_app_close(&ctx, true).unwrap();
        assert_eq!(ctx.device().active_screen(), display.main_screen());
    }
}
