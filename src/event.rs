use crate::sync::{Condvar, Mutex};
use core::fmt;

/// How a triggered [`Event`] returns to the non-signaled state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetMode {
    /// Stays signaled until [`Event::reset`]; releases every waiter.
    Manual,
    /// Consumed by the first waiter that observes it.
    Auto,
}

/// Waitable binary event.
///
/// Used both as the one-shot completion event of a task (`Manual`) and as a
/// worker's wake event (`Auto`). A trigger that happens before the matching
/// wait is never lost.
pub struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
    mode: ResetMode,
}

impl Event {
    /// Creates a non-signaled event.
    pub fn new(mode: ResetMode) -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
            mode,
        }
    }

    /// Signals the event, waking one waiter (`Auto`) or all of them
    /// (`Manual`).
    pub fn trigger(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        match self.mode {
            ResetMode::Manual => self.cond.notify_all(),
            ResetMode::Auto => self.cond.notify_one(),
        }
        drop(signaled);
    }

    /// Returns the event to the non-signaled state.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Blocks until the event is signaled.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            signaled = self.cond.wait(signaled);
        }
        if self.mode == ResetMode::Auto {
            *signaled = false;
        }
    }

    /// Non-blocking check. Consumes the signal of an `Auto` event.
    pub fn try_wait(&self) -> bool {
        let mut signaled = self.signaled.lock();
        let was_signaled = *signaled;
        if was_signaled && self.mode == ResetMode::Auto {
            *signaled = false;
        }
        was_signaled
    }

    /// Reset mode this event was created with.
    pub fn mode(&self) -> ResetMode {
        self.mode
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
