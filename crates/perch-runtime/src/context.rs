#![forbid(unsafe_code)]

//! The shared system context.
//!
//! [`Context`] owns what every component needs a handle to: the graphics
//! kernel device, the [`EventBus`], the [`GuiLock`], and the system event
//! queue. Lifecycle control flow (start/stop/navigate requests) travels
//! through the queue and is drained by the cooperative pump, so a request
//! posted from inside an app hook never re-enters the manager while the
//! hook's borrows are live.

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use perch_core::geometry::{Size, SizeSpec};
use perch_core::lock::{GuiLock, GuiLockGuard, LockError, LockHooks};
use perch_gfx::GfxDevice;
use tracing::debug;

use crate::app::AppId;
use crate::display::DisplayData;
use crate::event_bus::{EventBus, EventId, EventTarget, Handler, HandlerToken};
use crate::manager::ManagerData;

/// A navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateKind {
    /// Deliver a back event to the active app.
    Back,
    /// Pause the active app and show the main screen.
    Home,
    /// Show the recents screen.
    Recents,
}

/// A queued lifecycle request, drained by the system pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// Start (or resume) the app.
    AppStart(AppId),
    /// Close the app.
    AppStop(AppId),
    /// Navigate the shell.
    Navigate(NavigateKind),
}

/// Cloneable sender/drainer handle for the system event queue.
#[derive(Clone, Default)]
pub struct SystemEventQueue {
    inner: Rc<RefCell<VecDeque<SystemEvent>>>,
}

impl SystemEventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn post(&self, event: SystemEvent) {
        debug!(?event, "system event posted");
        self.inner.borrow_mut().push_back(event);
    }

    /// Take all queued events in posting order.
    pub fn drain(&self) -> Vec<SystemEvent> {
        self.inner.borrow_mut().drain(..).collect()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl fmt::Debug for SystemEventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemEventQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// Top-level system configuration.
#[derive(Debug, Clone)]
pub struct ContextData {
    /// System name, used in logs.
    pub name: String,
    /// Requested core screen size, resolved against the device.
    pub screen_size: SizeSpec,
    /// Display configuration.
    pub display: DisplayData,
    /// Manager configuration.
    pub manager: ManagerData,
}

/// Context error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// `begin` was called twice.
    AlreadyInitialized,
    /// An operation ran before `begin`.
    NotInitialized,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::AlreadyInitialized => write!(f, "context is already initialized"),
            ContextError::NotInitialized => write!(f, "context is not initialized"),
        }
    }
}

impl std::error::Error for ContextError {}

/// The shared context.
pub struct Context {
    data: ContextData,
    gfx: Rc<RefCell<dyn GfxDevice>>,
    bus: RefCell<EventBus>,
    lock: GuiLock,
    queue: SystemEventQueue,
    screen_size: Size,
    data_update_event: Option<EventId>,
    navigate_event: Option<EventId>,
    app_event: Option<EventId>,
}

impl Context {
    /// The bus target the context publishes its own events on.
    pub const EVENT_TARGET: EventTarget = EventTarget(0);

    /// Create a context over the given kernel device.
    pub fn new(data: ContextData, gfx: Rc<RefCell<dyn GfxDevice>>) -> Self {
        Self {
            data,
            gfx,
            bus: RefCell::new(EventBus::new()),
            lock: GuiLock::new(),
            queue: SystemEventQueue::new(),
            screen_size: Size::default(),
            data_update_event: None,
            navigate_event: None,
            app_event: None,
        }
    }

    /// Calibrate against the device and allocate the well-known event ids.
    pub fn begin(&mut self) -> Result<(), ContextError> {
        if self.is_initialized() {
            return Err(ContextError::AlreadyInitialized);
        }
        let resolution = self.gfx.borrow().resolution();
        self.screen_size = self.data.screen_size.calibrate(resolution);

        let mut bus = self.bus.borrow_mut();
        self.data_update_event = Some(bus.free_event_id());
        self.navigate_event = Some(bus.free_event_id());
        self.app_event = Some(bus.free_event_id());
        debug!(
            name = %self.data.name,
            width = self.screen_size.width,
            height = self.screen_size.height,
            "context initialized"
        );
        Ok(())
    }

    /// Whether `begin` has run.
    pub fn is_initialized(&self) -> bool {
        self.app_event.is_some()
    }

    /// The configuration the context was built from.
    pub fn data(&self) -> &ContextData {
        &self.data
    }

    /// The calibrated core screen size.
    pub fn display_size(&self) -> Size {
        self.screen_size
    }

    /// The kernel device.
    pub fn gfx(&self) -> &Rc<RefCell<dyn GfxDevice>> {
        &self.gfx
    }

    /// Shorthand for a mutable kernel borrow.
    pub fn device(&self) -> RefMut<'_, dyn GfxDevice> {
        self.gfx.borrow_mut()
    }

    /// The system event queue.
    pub fn queue(&self) -> &SystemEventQueue {
        &self.queue
    }

    /// Post a lifecycle request.
    pub fn post(&self, event: SystemEvent) {
        self.queue.post(event);
    }

    /// Acquire the GUI lock for out-of-loop kernel access.
    pub fn lock_gui(&self, timeout: Option<Duration>) -> Result<GuiLockGuard<'_>, LockError> {
        self.lock.acquire(timeout)
    }

    /// Register the host's lock callbacks.
    pub fn register_lock_hooks(&mut self, hooks: Rc<dyn LockHooks>) {
        self.lock.register_hooks(hooks);
    }

    /// The GUI lock itself.
    pub fn gui_lock(&self) -> &GuiLock {
        &self.lock
    }

    /// Mutable access to the event bus.
    pub fn bus(&self) -> RefMut<'_, EventBus> {
        self.bus.borrow_mut()
    }

    /// The data-update event id, once initialized.
    pub fn data_update_event(&self) -> Option<EventId> {
        self.data_update_event
    }

    /// The navigate event id, once initialized.
    pub fn navigate_event(&self) -> Option<EventId> {
        self.navigate_event
    }

    /// The app event id, once initialized.
    pub fn app_event(&self) -> Option<EventId> {
        self.app_event
    }

    /// Register a handler for data-update broadcasts.
    pub fn register_data_update(&self, handler: Handler) -> Result<HandlerToken, ContextError> {
        let id = self.data_update_event.ok_or(ContextError::NotInitialized)?;
        Ok(self.bus.borrow_mut().register(Self::EVENT_TARGET, id, handler))
    }

    /// Register an observer for navigation requests. The payload downcasts
    /// to [`NavigateKind`].
    pub fn register_navigate(&self, handler: Handler) -> Result<HandlerToken, ContextError> {
        let id = self.navigate_event.ok_or(ContextError::NotInitialized)?;
        Ok(self.bus.borrow_mut().register(Self::EVENT_TARGET, id, handler))
    }

    /// Register an observer for app start/stop requests. The payload
    /// downcasts to [`SystemEvent`].
    pub fn register_app_event(&self, handler: Handler) -> Result<HandlerToken, ContextError> {
        let id = self.app_event.ok_or(ContextError::NotInitialized)?;
        Ok(self.bus.borrow_mut().register(Self::EVENT_TARGET, id, handler))
    }

    /// Broadcast a drained request to its observers before it is handled.
    pub(crate) fn broadcast_request(&self, event: &SystemEvent) {
        let id = match event {
            SystemEvent::Navigate(_) => self.navigate_event,
            SystemEvent::AppStart(_) | SystemEvent::AppStop(_) => self.app_event,
        };
        let Some(id) = id else {
            return;
        };
        match event {
            SystemEvent::Navigate(kind) => {
                self.bus
                    .borrow_mut()
                    .send(Self::EVENT_TARGET, id, Some(kind));
            }
            other => {
                self.bus
                    .borrow_mut()
                    .send(Self::EVENT_TARGET, id, Some(other));
            }
        }
    }

    /// Broadcast a data-update to every registered handler.
    ///
    /// Returns `false` if any handler failed.
    pub fn send_data_update(&self, param: Option<&dyn Any>) -> Result<bool, ContextError> {
        let id = self.data_update_event.ok_or(ContextError::NotInitialized)?;
        Ok(self.bus.borrow_mut().send(Self::EVENT_TARGET, id, param))
    }

    /// Tear down: drop handlers and forget calibration.
    pub fn reset(&mut self) {
        self.bus.borrow_mut().reset();
        self.data_update_event = None;
        self.navigate_event = None;
        self.app_event = None;
        self.screen_size = Size::default();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.data.name)
            .field("screen_size", &self.screen_size)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerFlags;
    use perch_gfx::SimDevice;

    fn context() -> Context {
        let gfx: Rc<RefCell<dyn GfxDevice>> =
            Rc::new(RefCell::new(SimDevice::new(Size::new(480, 480))));
        Context::new(
            ContextData {
                name: "test".into(),
                screen_size: SizeSpec::FULL,
                display: DisplayData::default(),
                manager: ManagerData {
                    max_running: 3,
                    flags: ManagerFlags::empty(),
                },
            },
            gfx,
        )
    }

    #[test]
    fn begin_calibrates_and_allocates_event_ids() {
        let mut ctx = context();
        assert!(!ctx.is_initialized());
        ctx.begin().unwrap();
        assert!(ctx.is_initialized());
        assert_eq!(ctx.display_size(), Size::new(480, 480));
        assert!(ctx.data_update_event().is_some());
        assert!(ctx.navigate_event().is_some());
        assert!(ctx.app_event().is_some());
        assert_eq!(ctx.begin().unwrap_err(), ContextError::AlreadyInitialized);
    }

    #[test]
    fn queue_round_trips_in_order() {
        let ctx = context();
        ctx.post(SystemEvent::AppStart(AppId(1)));
        ctx.post(SystemEvent::Navigate(NavigateKind::Home));
        assert_eq!(
            ctx.queue().drain(),
            vec![
                SystemEvent::AppStart(AppId(1)),
                SystemEvent::Navigate(NavigateKind::Home)
            ]
        );
        assert!(ctx.queue().is_empty());
    }

    #[test]
    fn data_update_requires_begin() {
        let ctx = context();
        assert_eq!(
            ctx.send_data_update(None).unwrap_err(),
            ContextError::NotInitialized
        );
    }

    #[test]
    fn navigate_requests_reach_observers() {
        let mut ctx = context();
        ctx.begin().unwrap();
        let seen: Rc<RefCell<Option<NavigateKind>>> = Rc::new(RefCell::new(None));
        let seen_in = seen.clone();
        ctx.register_navigate(Box::new(move |data| {
            *seen_in.borrow_mut() = data
                .param
                .and_then(|p| p.downcast_ref::<NavigateKind>())
                .copied();
            true
        }))
        .unwrap();
        ctx.broadcast_request(&SystemEvent::Navigate(NavigateKind::Back));
        assert_eq!(*seen.borrow(), Some(NavigateKind::Back));
    }

    #[test]
    fn app_requests_reach_observers() {
        let mut ctx = context();
        ctx.begin().unwrap();
        let seen: Rc<RefCell<Option<SystemEvent>>> = Rc::new(RefCell::new(None));
        let seen_in = seen.clone();
        ctx.register_app_event(Box::new(move |data| {
            *seen_in.borrow_mut() = data
                .param
                .and_then(|p| p.downcast_ref::<SystemEvent>())
                .copied();
            true
        }))
        .unwrap();
        ctx.broadcast_request(&SystemEvent::AppStart(AppId(4)));
        assert_eq!(*seen.borrow(), Some(SystemEvent::AppStart(AppId(4))));
    }

    #[test]
    fn data_update_reaches_handlers() {
        let mut ctx = context();
        ctx.begin().unwrap();
        let seen = Rc::new(RefCell::new(false));
        let seen_in = seen.clone();
        ctx.register_data_update(Box::new(move |_| {
            *seen_in.borrow_mut() = true;
            true
        }))
        .unwrap();
        assert!(ctx.send_data_update(None).unwrap());
        assert!(*seen.borrow());
    }
}
