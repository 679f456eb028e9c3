use crate::{
    event::{Event, ResetMode},
    scheduler::Handle,
    sync::*,
    task::{TaskRef, TaskState},
};
use core::fmt;
use tracing::debug;

/// Per-worker state shared with the rest of the scheduler.
pub(super) struct WorkerThread {
    wake: Event,
    /// Task assigned by `Handle::schedule_task` while the worker was idle.
    current: Mutex<Option<TaskRef>>,
}

impl WorkerThread {
    pub(super) fn new() -> Self {
        Self {
            wake: Event::new(ResetMode::Auto),
            current: Mutex::new(None),
        }
    }

    /// Assigns a ready task to this idle worker and wakes it.
    pub(super) fn set_task(&self, task: TaskRef) {
        task.header()
            .transition(TaskState::Ready, TaskState::Dispatched);
        let previous = self.current.lock().replace(task);
        assert!(previous.is_none(), "idle worker already had a task assigned");
        self.wake.trigger();
    }

    pub(super) fn wake(&self) {
        self.wake.trigger();
    }

    fn take_task(&self) -> Option<TaskRef> {
        self.current.lock().take()
    }
}

impl fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerThread")
            .field("busy", &self.current.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// Worker loop: run ready tasks back to back, help with the scheduling slice
/// once none is left, then sleep until a task is assigned.
pub(super) fn run(handle: &Handle, index: usize) {
    debug!(worker = index, "worker started");
    let worker = &handle.shared.workers[index];
    let mut next = handle.next_ready_task(index);
    loop {
        while let Some(task) = next {
            handle.trigger(task);
            next = handle.next_ready_task(index);
        }
        handle.scheduler_slice();
        if handle.is_stopping() {
            break;
        }
        worker.wake.wait();
        next = worker.take_task();
    }
    debug!(worker = index, "worker stopped");
}
