use crate::sync::UnsafeCell;
use core::num::NonZeroU64;
use derive_more::{Deref, DerefMut};

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Sync`.
///
/// Used for queue slots and task bodies, where exclusive access is granted by
/// the surrounding protocol (slot stamps, task state transitions) rather than
/// by the type system.
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Sync> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Pads and aligns a value to 128 bytes so that neighbouring hot atomics do
/// not share a cache line (two 64-byte lines, to cover adjacent-line
/// prefetching).
#[derive(Debug, Default, Deref, DerefMut)]
#[repr(align(128))]
pub(crate) struct CachePadded<T>(T);

impl<T> CachePadded<T> {
    pub(crate) const fn new(val: T) -> Self {
        Self(val)
    }
}

/// Identifier assigned to a task when it is first submitted to a scheduler.
///
/// IDs are monotonically increasing per scheduler and are used as the key of
/// the dependency registry's hash buckets.
pub type TaskId = NonZeroU64;
