#![forbid(unsafe_code)]

//! Publish/subscribe event bus with dynamic event-id recycling.
//!
//! The kernel's own event system knows only a small range of built-in codes;
//! the bus multiplexes unlimited logical event kinds onto dynamically
//! allocated ids. Handlers are keyed by (target, event id) and invoked in
//! registration order. An id returns to the recycle pool only when no
//! handler anywhere — on any target — still references it: reference
//! counting is global by id, not per target.
//!
//! Sends to a key without handlers succeed silently; unregistered sends are
//! expected and harmless.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::{debug, error};

/// A logical event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

impl EventId {
    /// First dynamically allocatable id; ids below are reserved for
    /// host-defined static kinds.
    pub const CUSTOM: EventId = EventId(1000);
}

/// The listener identity half of a bus key.
///
/// Targets are opaque; components pick their own (widget instance tokens,
/// app ids, the context's well-known target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTarget(pub u64);

/// Token identifying one registration, for narrow unregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

/// The payload a handler receives.
pub struct EventData<'a> {
    /// The event kind.
    pub id: EventId,
    /// The target the event was sent to.
    pub target: EventTarget,
    /// Optional sender-supplied parameter.
    pub param: Option<&'a dyn Any>,
}

/// A registered handler. Returns `false` to report failure; the bus keeps
/// invoking the remaining handlers either way.
pub type Handler = Box<dyn FnMut(&EventData<'_>) -> bool>;

struct Registration {
    token: HandlerToken,
    handler: Handler,
}

/// The event bus.
pub struct EventBus {
    handlers: HashMap<EventTarget, HashMap<EventId, Vec<Registration>>>,
    recycled: BTreeSet<EventId>,
    next_id: u32,
    next_token: u64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            recycled: BTreeSet::new(),
            next_id: EventId::CUSTOM.0,
            next_token: 0,
        }
    }

    /// Drop every handler and forget all id bookkeeping.
    pub fn reset(&mut self) {
        self.handlers.clear();
        self.recycled.clear();
        self.next_id = EventId::CUSTOM.0;
    }

    /// Append a handler under (target, id). Multiple handlers per key are
    /// allowed and run in registration order.
    pub fn register(
        &mut self,
        target: EventTarget,
        id: EventId,
        handler: Handler,
    ) -> HandlerToken {
        self.next_token += 1;
        let token = HandlerToken(self.next_token);
        debug!(?target, ?id, ?token, "register event handler");
        self.handlers
            .entry(target)
            .or_default()
            .entry(id)
            .or_default()
            .push(Registration { token, handler });
        token
    }

    /// Invoke every handler under (target, id) in order.
    ///
    /// Returns `false` if any handler failed; an absent key is a successful
    /// no-op.
    pub fn send(&mut self, target: EventTarget, id: EventId, param: Option<&dyn Any>) -> bool {
        let Some(for_target) = self.handlers.get_mut(&target) else {
            return true;
        };
        let Some(registrations) = for_target.get_mut(&id) else {
            return true;
        };
        let mut ok = true;
        let data = EventData { id, target, param };
        for registration in registrations.iter_mut() {
            if !(registration.handler)(&data) {
                error!(?target, ?id, "event handler failed");
                ok = false;
            }
        }
        ok
    }

    /// Remove every handler registered under the target.
    pub fn unregister_target(&mut self, target: EventTarget) {
        let Some(for_target) = self.handlers.remove(&target) else {
            return;
        };
        let ids: Vec<EventId> = for_target.keys().copied().collect();
        debug!(?target, removed = for_target.len(), "unregister target");
        for id in ids {
            self.maybe_recycle(id);
        }
    }

    /// Remove every handler registered under (target, id).
    pub fn unregister_target_event(&mut self, target: EventTarget, id: EventId) {
        let Some(for_target) = self.handlers.get_mut(&target) else {
            return;
        };
        if for_target.remove(&id).is_none() {
            return;
        }
        if for_target.is_empty() {
            self.handlers.remove(&target);
        }
        debug!(?target, ?id, "unregister target event");
        self.maybe_recycle(id);
    }

    /// Remove the single registration named by the token, wherever it is.
    pub fn unregister_token(&mut self, token: HandlerToken) {
        let mut freed: Option<EventId> = None;
        self.handlers.retain(|_, for_target| {
            for_target.retain(|&id, registrations| {
                let before = registrations.len();
                registrations.retain(|r| r.token != token);
                if registrations.len() != before {
                    freed = Some(id);
                }
                !registrations.is_empty()
            });
            !for_target.is_empty()
        });
        if let Some(id) = freed {
            debug!(?token, ?id, "unregister handler token");
            self.maybe_recycle(id);
        }
    }

    /// Remove every handler for the id across all targets.
    ///
    /// The id is recycled unconditionally: after this call nothing can
    /// reference it.
    pub fn unregister_event(&mut self, id: EventId) {
        self.handlers.retain(|_, for_target| {
            for_target.remove(&id);
            !for_target.is_empty()
        });
        debug!(?id, "unregister event id everywhere");
        self.recycle(id);
    }

    /// Hand out an event id: a recycled one when available, else a fresh
    /// monotonically increasing allocation.
    pub fn free_event_id(&mut self) -> EventId {
        if let Some(&id) = self.recycled.iter().next() {
            self.recycled.remove(&id);
            debug!(?id, "reusing recycled event id");
            return id;
        }
        self.next_id += 1;
        EventId(self.next_id)
    }

    /// Whether any handler anywhere references the id.
    pub fn id_in_use(&self, id: EventId) -> bool {
        self.handlers
            .values()
            .any(|for_target| for_target.contains_key(&id))
    }

    /// Total number of registrations across all keys.
    pub fn handler_count(&self) -> usize {
        self.handlers
            .values()
            .flat_map(|for_target| for_target.values())
            .map(Vec::len)
            .sum()
    }

    fn maybe_recycle(&mut self, id: EventId) {
        if !self.id_in_use(id) {
            self.recycle(id);
        }
    }

    fn recycle(&mut self, id: EventId) {
        // Only dynamically allocated ids go back to the pool; reserved
        // static ids would otherwise leak into free allocation.
        if id > EventId::CUSTOM {
            debug!(?id, "recycling event id");
            self.recycled.insert(id);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("targets", &self.handlers.len())
            .field("handlers", &self.handler_count())
            .field("recycled", &self.recycled)
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const TARGET_A: EventTarget = EventTarget(1);
    const TARGET_B: EventTarget = EventTarget(2);

    fn recorder(log: &Rc<RefCell<Vec<u32>>>, value: u32) -> Handler {
        let log = log.clone();
        Box::new(move |_| {
            log.borrow_mut().push(value);
            true
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.register(TARGET_A, id, recorder(&log, 1));
        bus.register(TARGET_A, id, recorder(&log, 2));
        bus.register(TARGET_A, id, recorder(&log, 3));

        assert!(bus.send(TARGET_A, id, None));
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn send_without_handlers_succeeds() {
        let mut bus = EventBus::new();
        assert!(bus.send(TARGET_A, EventId(42), None));
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.register(TARGET_A, id, Box::new(|_| false));
        bus.register(TARGET_A, id, recorder(&log, 7));

        assert!(!bus.send(TARGET_A, id, None));
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn param_is_delivered() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        let seen = Rc::new(RefCell::new(0i32));
        let seen_in = seen.clone();
        bus.register(
            TARGET_A,
            id,
            Box::new(move |data| {
                if let Some(v) = data.param.and_then(|p| p.downcast_ref::<i32>()) {
                    *seen_in.borrow_mut() = *v;
                }
                true
            }),
        );
        let payload = 31i32;
        assert!(bus.send(TARGET_A, id, Some(&payload)));
        assert_eq!(*seen.borrow(), 31);
    }

    #[test]
    fn id_recycled_only_when_unused_everywhere() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        bus.register(TARGET_A, id, Box::new(|_| true));
        bus.register(TARGET_B, id, Box::new(|_| true));

        bus.unregister_target(TARGET_A);
        assert!(bus.id_in_use(id), "B still references the id");
        let fresh = bus.free_event_id();
        assert_ne!(fresh, id);

        bus.unregister_target(TARGET_B);
        assert!(!bus.id_in_use(id));
        assert_eq!(bus.free_event_id(), id, "fully released id is reused");
    }

    #[test]
    fn unregister_target_event_narrows_correctly() {
        let mut bus = EventBus::new();
        let id_a = bus.free_event_id();
        let id_b = bus.free_event_id();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.register(TARGET_A, id_a, recorder(&log, 1));
        bus.register(TARGET_A, id_b, recorder(&log, 2));

        bus.unregister_target_event(TARGET_A, id_a);
        bus.send(TARGET_A, id_a, None);
        bus.send(TARGET_A, id_b, None);
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn unregister_token_removes_single_registration() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        let log = Rc::new(RefCell::new(Vec::new()));
        let token = bus.register(TARGET_A, id, recorder(&log, 1));
        bus.register(TARGET_A, id, recorder(&log, 2));

        bus.unregister_token(token);
        bus.send(TARGET_A, id, None);
        assert_eq!(*log.borrow(), vec![2]);
        assert_eq!(bus.handler_count(), 1);
    }

    #[test]
    fn unregister_event_clears_all_targets_and_recycles() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        bus.register(TARGET_A, id, Box::new(|_| true));
        bus.register(TARGET_B, id, Box::new(|_| true));

        bus.unregister_event(id);
        assert_eq!(bus.handler_count(), 0);
        assert_eq!(bus.free_event_id(), id);
    }

    #[test]
    fn static_ids_are_never_recycled() {
        let mut bus = EventBus::new();
        let static_id = EventId(5);
        bus.register(TARGET_A, static_id, Box::new(|_| true));
        bus.unregister_target(TARGET_A);
        assert_ne!(bus.free_event_id(), static_id);
    }

    #[test]
    fn fresh_ids_are_monotonic() {
        let mut bus = EventBus::new();
        let a = bus.free_event_id();
        let b = bus.free_event_id();
        assert!(b > a);
    }

    #[test]
    fn reset_clears_everything() {
        let mut bus = EventBus::new();
        let id = bus.free_event_id();
        bus.register(TARGET_A, id, Box::new(|_| true));
        bus.reset();
        assert_eq!(bus.handler_count(), 0);
        assert_eq!(bus.free_event_id(), id, "allocation restarts");
    }
}
