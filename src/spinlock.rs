use crate::{
    atomic::{AtomicWord, memory_barrier},
    sync::*,
    types::SyncUnsafeCell,
};
use core::fmt;

/// A spinlock protecting a `T`.
///
/// `WAIT = false` gives up after the first failed attempt; `SLEEP` yields the
/// OS thread between polls instead of busy-polling. While waiting, the lock
/// word is only read until it changes.
pub struct SpinLock<T, const WAIT: bool, const SLEEP: bool> {
    word: AtomicWord,
    data: SyncUnsafeCell<T>,
}

/// Non-blocking try-lock.
pub type TrySpinLock<T> = SpinLock<T, false, false>;
/// Spinlock that yields its time slice while contended.
pub type YieldingSpinLock<T> = SpinLock<T, true, true>;
/// Spinlock that busy-polls while contended.
pub type BusySpinLock<T> = SpinLock<T, true, false>;

unsafe impl<T: Send, const WAIT: bool, const SLEEP: bool> Send for SpinLock<T, WAIT, SLEEP> {}
unsafe impl<T: Send, const WAIT: bool, const SLEEP: bool> Sync for SpinLock<T, WAIT, SLEEP> {}

impl<T, const WAIT: bool, const SLEEP: bool> SpinLock<T, WAIT, SLEEP> {
    /// Creates an unlocked spinlock.
    pub fn new(data: T) -> Self {
        Self {
            word: AtomicWord::new(0),
            data: SyncUnsafeCell::new(data),
        }
    }

    /// Acquires the lock according to the `WAIT`/`SLEEP` policy.
    ///
    /// Returns `None` only when `WAIT` is false and the lock is held by
    /// someone else.
    pub fn lock(&self) -> Option<SpinLockGuard<'_, T, WAIT, SLEEP>> {
        loop {
            if let Some(guard) = self.try_lock() {
                return Some(guard);
            }
            if !WAIT {
                return None;
            }
            while self.word.get() != 0 {
                if SLEEP {
                    thread::yield_now();
                } else {
                    spin_loop();
                }
            }
        }
    }

    /// Single acquisition attempt regardless of the policy.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T, WAIT, SLEEP>> {
        // A guard must only exist once the CAS is won: dropping one unlocks.
        if self.word.compare_and_swap(0, 1) == 0 {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Whether the lock is currently held by anyone.
    pub fn is_locked(&self) -> bool {
        self.word.get() != 0
    }

    fn unlock(&self) {
        memory_barrier();
        self.word.set(0);
    }
}

impl<T: Default, const WAIT: bool, const SLEEP: bool> Default for SpinLock<T, WAIT, SLEEP> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, const WAIT: bool, const SLEEP: bool> fmt::Debug for SpinLock<T, WAIT, SLEEP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .field("wait", &WAIT)
            .field("sleep", &SLEEP)
            .finish_non_exhaustive()
    }
}

/// Releases the lock when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a, T, const WAIT: bool, const SLEEP: bool> {
    lock: &'a SpinLock<T, WAIT, SLEEP>,
}

impl<T, const WAIT: bool, const SLEEP: bool> SpinLockGuard<'_, T, WAIT, SLEEP> {
    /// Runs `f` with exclusive access to the protected value.
    pub fn with<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        // SAFETY: holding the guard means the lock word is 1 and was set by
        // this guard's acquisition; nobody else can reach `data`.
        unsafe { self.lock.data.get_mut().with(|ptr| f(&mut *ptr)) }
    }
}

impl<T, const WAIT: bool, const SLEEP: bool> Drop for SpinLockGuard<'_, T, WAIT, SLEEP> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl<T, const WAIT: bool, const SLEEP: bool> fmt::Debug for SpinLockGuard<'_, T, WAIT, SLEEP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLockGuard").finish_non_exhaustive()
    }
}
