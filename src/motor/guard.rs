// Scoped exclusive access to the shared I2C bus
//
// Every transaction goes through `acquire()`; the returned guard releases the
// bus when dropped, so early returns and panics cannot leak an acquisition.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Acquisition counters, mostly useful to check the bus is never left held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    pub acquired: u64,
    pub released: u64,
}

impl GuardStats {
    pub fn is_balanced(&self) -> bool {
        self.acquired == self.released
    }
}

/// Mutual-exclusion wrapper around a bus resource
#[derive(Debug, Default)]
pub struct AcquisitionGuard<T> {
    inner: Mutex<T>,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl<T> AcquisitionGuard<T> {
    pub fn new(resource: T) -> Self {
        Self {
            inner: Mutex::new(resource),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Block until the bus is free and take it
    ///
    /// A panic in an earlier holder poisons the lock; the resource itself is
    /// still consistent at the register level, so ownership is recovered.
    pub fn acquire(&self) -> Acquired<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        trace!("Bus acquired");
        Acquired {
            guard,
            released: &self.released,
        }
    }

    /// Run `f` with exclusive access, releasing afterwards on every path
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut held = self.acquire();
        f(&mut held)
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held bus; dereferences to the guarded resource
pub struct Acquired<'a, T> {
    guard: MutexGuard<'a, T>,
    released: &'a AtomicU64,
}

impl<T> Acquired<'_, T> {
    /// Give the bus back before the end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl<T> Deref for Acquired<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Acquired<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for Acquired<'_, T> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        trace!("Bus released");
    }
}
