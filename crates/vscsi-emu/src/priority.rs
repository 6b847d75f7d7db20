//! Priority-floor tracking for lock acquisition.
//!
//! Engine entry points run in a non-blocking dispatch context. Taking one of the engine's locks
//! raises the caller's effective priority floor to [`Priority::Dispatch`]; the floor returns to the
//! caller's own level only once every guard taken through that context is released, in any order.
//! Callers thread an [`ExecutionContext`] through every
//! routine that may lock, and must re-read [`ExecutionContext::floor`] rather than caching it across
//! such calls.

use core::cell::Cell;
use core::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// The caller may block (backing-store I/O, waits).
    Passive,
    /// Non-blocking, non-preemptible dispatch context.
    Dispatch,
}

/// The calling context's current priority floor.
///
/// Not `Sync`: one context belongs to one caller.
#[derive(Debug)]
pub struct ExecutionContext {
    base: Priority,
    /// Number of live [`FloorGuard`]s taken through this context.
    held: Cell<usize>,
}

impl ExecutionContext {
    pub fn new(floor: Priority) -> Self {
        Self {
            base: floor,
            held: Cell::new(0),
        }
    }

    pub fn passive() -> Self {
        Self::new(Priority::Passive)
    }

    pub fn dispatch() -> Self {
        Self::new(Priority::Dispatch)
    }

    pub fn floor(&self) -> Priority {
        if self.held.get() > 0 {
            self.base.max(Priority::Dispatch)
        } else {
            self.base
        }
    }

    pub fn may_block(&self) -> bool {
        self.floor() == Priority::Passive
    }

    fn acquire(&self) {
        self.held.set(self.held.get() + 1);
    }

    fn release(&self) {
        self.held.set(self.held.get().saturating_sub(1));
    }
}

/// Mutex whose guard raises and restores the holder's priority floor.
#[derive(Debug, Default)]
pub struct FloorLock<T> {
    inner: Mutex<T>,
}

impl<T> FloorLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock<'a>(&'a self, cx: &'a ExecutionContext) -> FloorGuard<'a, T> {
        cx.acquire();
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        FloorGuard { cx, guard }
    }

    pub fn into_inner(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scoped lock guard; dropping it releases the lock. The floor is lowered only when no other guard
/// from the same context is still live.
pub struct FloorGuard<'a, T> {
    cx: &'a ExecutionContext,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for FloorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for FloorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for FloorGuard<'_, T> {
    fn drop(&mut self) {
        self.cx.release();
    }
}
