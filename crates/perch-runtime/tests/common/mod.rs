//! Shared fixtures for runtime integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use perch_core::geometry::Size;
use perch_gfx::{CallbackToken, ClassId, GfxDevice, ScreenHandle, SimDevice, TimerHandle, UserToken};
use perch_runtime::{
    App, AppConfig, AppFlags, ContextData, DisplayData, HookCtx, HookError, ManagerData,
    ManagerFlags, System,
};

/// A system over a simulated kernel, with the typed device kept around for
/// direct inspection.
pub struct Fixture {
    pub sim: Rc<RefCell<SimDevice>>,
    pub system: System,
}

pub const SCREEN: Size = Size {
    width: 480,
    height: 800,
};

pub fn context_data() -> ContextData {
    ContextData {
        name: "test-shell".into(),
        screen_size: perch_core::geometry::SizeSpec::FULL,
        display: DisplayData::default(),
        manager: ManagerData {
            max_running: 3,
            flags: ManagerFlags::empty(),
        },
    }
}

pub fn fixture(data: ContextData) -> Fixture {
    let sim = Rc::new(RefCell::new(SimDevice::new(SCREEN)));
    let gfx: Rc<RefCell<dyn GfxDevice>> = sim.clone();
    let mut system = System::new(data, gfx);
    system.begin().expect("system begin");
    Fixture { sim, system }
}

/// Scriptable app for lifecycle tests.
pub struct TestApp {
    pub config: AppConfig,
    /// Timers to create inside `run`.
    pub timers: usize,
    /// Animations to create inside `run`.
    pub anims: usize,
    pub fail_init: bool,
    pub fail_run: bool,
    pub fail_pause: bool,
    pub fail_resume: bool,
    pub notify_on_back: bool,
    /// Hook invocations in order.
    pub calls: Vec<&'static str>,
    /// Resolution observed inside `run`.
    pub seen_resolution: Option<Size>,
    pub created_screens: Vec<ScreenHandle>,
    pub created_timers: Vec<TimerHandle>,
}

impl TestApp {
    pub fn new(name: &str) -> Self {
        // Recycle on, resize off: most tests care about cleanup, not layout.
        let config = AppConfig::new(name, false).with_flags(AppFlags::RECYCLE_RESOURCES);
        Self {
            config,
            timers: 0,
            anims: 0,
            fail_init: false,
            fail_run: false,
            fail_pause: false,
            fail_resume: false,
            notify_on_back: false,
            calls: Vec::new(),
            seen_resolution: None,
            created_screens: Vec::new(),
            created_timers: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: AppFlags) -> Self {
        self.config.flags = flags;
        self
    }

    pub fn with_resources(mut self, timers: usize, anims: usize) -> Self {
        self.timers = timers;
        self.anims = anims;
        self
    }

    pub fn shared(self) -> Rc<RefCell<TestApp>> {
        Rc::new(RefCell::new(self))
    }
}

impl App for TestApp {
    fn config(&self) -> &AppConfig {
        &self.config
    }

    fn run(&mut self, ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("run");
        self.seen_resolution = Some(ctx.gfx().resolution());
        if !self.config.flags.contains(AppFlags::DEFAULT_SCREEN) {
            let mut dev = ctx.gfx();
            let screen = dev.create_screen(ClassId(10));
            dev.load_screen(screen)
                .map_err(|e| HookError::new(e.to_string()))?;
            self.created_screens.push(screen);
        }
        for i in 0..self.timers {
            let timer =
                ctx.gfx()
                    .create_timer(CallbackToken(100 + i as u64), UserToken::NONE, 100);
            self.created_timers.push(timer);
        }
        for i in 0..self.anims {
            ctx.gfx()
                .start_anim(UserToken(200 + i as u64), CallbackToken(300));
        }
        if self.fail_run {
            return Err(HookError::new("scripted run failure"));
        }
        Ok(())
    }

    fn back(&mut self, ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("back");
        if self.notify_on_back {
            ctx.notify_closed();
        }
        Ok(())
    }

    fn init(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("init");
        if self.fail_init {
            return Err(HookError::new("scripted init failure"));
        }
        Ok(())
    }

    fn deinit(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("deinit");
        Ok(())
    }

    fn pause(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("pause");
        if self.fail_pause {
            return Err(HookError::new("scripted pause failure"));
        }
        Ok(())
    }

    fn resume(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("resume");
        if self.fail_resume {
            return Err(HookError::new("scripted resume failure"));
        }
        Ok(())
    }

    fn close(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("close");
        Ok(())
    }

    fn clean_resource(&mut self, _ctx: &mut HookCtx<'_>) -> Result<(), HookError> {
        self.calls.push("clean_resource");
        Ok(())
    }
}
