// src/engine/guard.rs

//! Scoped lock counter used to detect reentrant calls.
//!
//! The tree holds a [`GuardLocker`] around every user callback. Public entry
//! points (`start`, `stop`, `set_recipe`, drop) check [`Guard::is_locked`] and
//! refuse to run from inside a callback. Containers use their own guard to
//! know they are still issuing children.

use std::cell::Cell;

#[derive(Debug, Default)]
pub struct Guard {
    lock_count: Cell<u32>,
}

impl Guard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count.get() > 0
    }
}

/// Holds one lock on a [`Guard`] until dropped. Locks nest.
#[must_use = "the guard is released as soon as the locker is dropped"]
pub struct GuardLocker<'a> {
    guard: &'a Guard,
}

impl<'a> GuardLocker<'a> {
    pub fn new(guard: &'a Guard) -> Self {
        guard.lock_count.set(guard.lock_count.get() + 1);
        Self { guard }
    }
}

impl Drop for GuardLocker<'_> {
    fn drop(&mut self) {
        let count = self.guard.lock_count.get();
        self.guard.lock_count.set(count.saturating_sub(1));
    }
}
