use crate::sync::{AtomicIsize, AtomicUsize, Ordering, fence};
use core::fmt;
use std::sync::Arc;

/// Full compiler and hardware memory barrier.
///
/// Every read-modify-write in this module is `SeqCst` as well; the queue and
/// scheduler algorithms are written against sequential consistency.
#[inline]
pub fn memory_barrier() {
    fence(Ordering::SeqCst);
}

macro_rules! atomic_word {
    ($(#[$meta:meta])* $name:ident, $atomic:ty, $int:ty) => {
        $(#[$meta])*
        #[repr(transparent)]
        pub(crate) struct $name($atomic);

        #[allow(dead_code)]
        impl $name {
            pub(crate) fn new(value: $int) -> Self {
                Self(<$atomic>::new(value))
            }

            #[inline]
            pub(crate) fn get(&self) -> $int {
                self.0.load(Ordering::SeqCst)
            }

            #[inline]
            pub(crate) fn set(&self, value: $int) {
                self.0.store(value, Ordering::SeqCst);
            }

            /// Returns the incremented value.
            #[inline]
            pub(crate) fn increment(&self) -> $int {
                self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
            }

            /// Returns the decremented value.
            #[inline]
            pub(crate) fn decrement(&self) -> $int {
                self.0.fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
            }

            /// Returns the previous value.
            #[inline]
            pub(crate) fn add(&self, delta: $int) -> $int {
                self.0.fetch_add(delta, Ordering::SeqCst)
            }

            /// Returns the previous value.
            #[inline]
            pub(crate) fn exchange(&self, value: $int) -> $int {
                self.0.swap(value, Ordering::SeqCst)
            }

            /// Stores `new` if the word equals `current`. Returns the value
            /// observed before the operation, so success is
            /// `returned == current`.
            #[inline]
            pub(crate) fn compare_and_swap(&self, current: $int, new: $int) -> $int {
                match self
                    .0
                    .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
                {
                    Ok(previous) => {
                        memory_barrier();
                        previous
                    }
                    Err(previous) => previous,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.get()).finish()
            }
        }
    };
}

atomic_word!(
    /// Signed machine word with linearizable arithmetic.
    AtomicWord,
    AtomicIsize,
    isize
);

atomic_word!(
    /// Unsigned machine word, used for queue cursors, slot stamps and ID
    /// generation.
    AtomicCursor,
    AtomicUsize,
    usize
);

/// Shared join counter.
///
/// Every task owns one (its *sync counter*); any task may additionally point
/// at an external one (its *exec counter*). Constructing a task with an exec
/// counter increments it, and the task's completion decrements it, so a
/// counter shared by N siblings reaches zero exactly when all N have
/// completed.
#[derive(Clone)]
pub struct JoinCounter(Arc<AtomicWord>);

impl JoinCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicWord::new(0)))
    }

    /// Current number of outstanding units of work.
    #[must_use]
    pub fn get(&self) -> isize {
        self.0.get()
    }

    /// Whether all registered units of work have completed.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.get() == 0
    }

    pub(crate) fn increment(&self) -> isize {
        self.0.increment()
    }

    pub(crate) fn decrement(&self) -> isize {
        let remaining = self.0.decrement();
        assert!(remaining >= 0, "JoinCounter decremented below zero");
        remaining
    }

    /// Whether both handles refer to the same counter.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for JoinCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JoinCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JoinCounter").field(&self.get()).finish()
    }
}
