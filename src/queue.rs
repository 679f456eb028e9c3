use crate::sync::ArrayQueue;
use core::fmt;
use tracing::error;

/// Bounded lock-free MPMC queue. Capacity is rounded up to a power of two.
pub struct BoundedQueue<T> {
    slots: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at least `capacity` elements.
    ///
    /// # Panics
    /// If `capacity` is zero or cannot be rounded to a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");
        let capacity = capacity
            .checked_next_power_of_two()
            .expect("BoundedQueue capacity overflows usize");
        Self {
            slots: ArrayQueue::new(capacity),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Approximate number of queued elements.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the queue was observed empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends `value`, handing it back if the queue is full.
    ///
    /// # Errors
    /// Returns `value` when the queue holds `capacity` unconsumed elements.
    pub fn enqueue(&self, value: T) -> Result<(), T> {
        self.slots.push(value)
    }

    /// Removes the oldest element, or returns `None` if the queue was
    /// observed empty.
    pub fn dequeue(&self) -> Option<T> {
        self.slots.pop()
    }

    /// Appends `value`; overflowing the queue is a fatal contract violation.
    ///
    /// # Panics
    /// If the queue is full.
    pub fn enqueue_or_abort(&self, value: T, queue: &'static str) {
        if self.enqueue(value).is_err() {
            error!(queue, capacity = self.capacity(), "bounded queue overflow");
            panic!("{queue} queue overflow: capacity {} exhausted", self.capacity());
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
