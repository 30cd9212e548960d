#![forbid(unsafe_code)]

//! Reentrant bookkeeping wrapper around the host's graphics-kernel lock.
//!
//! Graphics-kernel calls made from outside its own render loop (for example
//! from a host timer task) must be serialized against the loop. Perch does
//! not implement that synchronization primitive itself; the host registers a
//! pair of lock/unlock callbacks via [`LockHooks`] and [`GuiLock`] only
//! tracks nesting depth and guarantees paired release through
//! [`GuiLockGuard`].
//!
//! There is no global singleton: a [`GuiLock`] is constructed explicitly,
//! owned by the top-level context, and handed by reference to whoever needs
//! it.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::logging::trace;

/// Host-provided lock callbacks.
///
/// `lock` returns `false` when the timeout elapses before the lock is
/// acquired; `None` means wait forever.
pub trait LockHooks {
    /// Acquire the underlying lock, waiting at most `timeout`.
    fn lock(&self, timeout: Option<Duration>) -> bool;

    /// Release the underlying lock.
    fn unlock(&self);
}

/// Error acquiring the GUI lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The host lock callback reported a timeout.
    Timeout,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Timeout => write!(f, "GUI lock acquisition timed out"),
        }
    }
}

impl std::error::Error for LockError {}

/// Nesting-depth bookkeeping over host lock callbacks.
///
/// Without registered hooks the lock degrades to pure bookkeeping: acquiring
/// always succeeds and only the depth counter moves. This keeps headless
/// tests and single-context hosts free of ceremony.
pub struct GuiLock {
    hooks: Option<Rc<dyn LockHooks>>,
    depth: Cell<u32>,
}

impl GuiLock {
    /// Create a lock with no host callbacks (bookkeeping only).
    pub fn new() -> Self {
        Self {
            hooks: None,
            depth: Cell::new(0),
        }
    }

    /// Create a lock delegating to the given host callbacks.
    pub fn with_hooks(hooks: Rc<dyn LockHooks>) -> Self {
        Self {
            hooks: Some(hooks),
            depth: Cell::new(0),
        }
    }

    /// Register or replace the host callbacks.
    ///
    /// Must not be called while the lock is held; the depth counter would
    /// no longer describe the underlying lock.
    pub fn register_hooks(&mut self, hooks: Rc<dyn LockHooks>) {
        debug_assert_eq!(self.depth.get(), 0);
        self.hooks = Some(hooks);
    }

    /// Acquire the lock, returning a scope guard that releases on drop.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<GuiLockGuard<'_>, LockError> {
        if let Some(hooks) = &self.hooks {
            if !hooks.lock(timeout) {
                return Err(LockError::Timeout);
            }
        }
        self.depth.set(self.depth.get() + 1);
        trace!(depth = self.depth.get(), "GUI lock acquired");
        Ok(GuiLockGuard { lock: self })
    }

    /// Current nesting depth (0 when unheld).
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    fn release(&self) {
        let depth = self.depth.get();
        debug_assert!(depth > 0);
        self.depth.set(depth.saturating_sub(1));
        if let Some(hooks) = &self.hooks {
            hooks.unlock();
        }
    }
}

impl Default for GuiLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GuiLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuiLock")
            .field("hooks", &self.hooks.as_ref().map(|_| "<dyn LockHooks>"))
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// Scope guard returned by [`GuiLock::acquire`].
///
/// Dropping the guard releases the lock exactly once, so early returns and
/// error paths cannot leave the kernel locked.
#[derive(Debug)]
pub struct GuiLockGuard<'a> {
    lock: &'a GuiLock,
}

impl Drop for GuiLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CountingHooks {
        locks: RefCell<u32>,
        unlocks: RefCell<u32>,
        fail: bool,
    }

    impl CountingHooks {
        fn new(fail: bool) -> Rc<Self> {
            Rc::new(Self {
                locks: RefCell::new(0),
                unlocks: RefCell::new(0),
                fail,
            })
        }
    }

    impl LockHooks for CountingHooks {
        fn lock(&self, _timeout: Option<Duration>) -> bool {
            if self.fail {
                return false;
            }
            *self.locks.borrow_mut() += 1;
            true
        }

        fn unlock(&self) {
            *self.unlocks.borrow_mut() += 1;
        }
    }

    #[test]
    fn acquire_without_hooks_is_bookkeeping_only() {
        let lock = GuiLock::new();
        assert_eq!(lock.depth(), 0);
        {
            let _guard = lock.acquire(None).unwrap();
            assert_eq!(lock.depth(), 1);
        }
        assert_eq!(lock.depth(), 0);
    }

    #[test]
    fn nested_acquire_tracks_depth() {
        let lock = GuiLock::new();
        let _outer = lock.acquire(None).unwrap();
        {
            let _inner = lock.acquire(None).unwrap();
            assert_eq!(lock.depth(), 2);
        }
        assert_eq!(lock.depth(), 1);
    }

    #[test]
    fn hooks_are_paired() {
        let hooks = CountingHooks::new(false);
        let lock = GuiLock::with_hooks(hooks.clone());
        {
            let _a = lock.acquire(Some(Duration::from_millis(10))).unwrap();
            let _b = lock.acquire(None).unwrap();
        }
        assert_eq!(*hooks.locks.borrow(), 2);
        assert_eq!(*hooks.unlocks.borrow(), 2);
        assert_eq!(lock.depth(), 0);
    }

    #[test]
    fn timeout_reports_error_and_leaves_depth() {
        let hooks = CountingHooks::new(true);
        let lock = GuiLock::with_hooks(hooks.clone());
        assert_eq!(lock.acquire(None).unwrap_err(), LockError::Timeout);
        assert_eq!(lock.depth(), 0);
        assert_eq!(*hooks.unlocks.borrow(), 0);
    }

    #[test]
    fn guard_releases_on_early_return() {
        let lock = GuiLock::new();
        fn inner(lock: &GuiLock) -> Result<(), LockError> {
            let _guard = lock.acquire(None)?;
            Err(LockError::Timeout)
        }
        let _ = inner(&lock);
        assert_eq!(lock.depth(), 0);
    }
}
