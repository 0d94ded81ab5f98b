//! Extension trait to ignore mutex poisoning.
//!
//! The cache and scheduler maps only ever hold whole, copy-on-write values, so a panic
//! in another task can't leave them half-written. This trait replaces the
//! `.lock().unwrap_or_else(|e| e.into_inner())` boilerplate with `.lock_ignore_poison()`.

use std::sync::{Mutex, MutexGuard};

pub trait IgnorePoison<T> {
    /// Locks the mutex, ignoring poison.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnorePoison<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| e.into_inner())
    }
}
