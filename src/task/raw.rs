use crate::{
    scheduler::Handle,
    sync::*,
    task::{ExecContext, Task, TaskError, TaskState, header::TaskHeader},
    types::{SyncUnsafeCell, TaskId},
    utils::panic_message,
};
use core::fmt;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tracing::debug;

/// A task body together with its header, allocated once and shared between
/// the producer's handle and the scheduler.
pub(crate) struct TaskCell<T> {
    pub(crate) header: TaskHeader,
    body: SyncUnsafeCell<T>,
}

impl<T: Task> TaskCell<T> {
    pub(crate) fn new(header: TaskHeader, body: T) -> Self {
        Self {
            header,
            body: SyncUnsafeCell::new(body),
        }
    }

    /// Shared view of the body once it can no longer be mutated.
    pub(crate) fn completed_body(&self) -> Option<&T> {
        if self.header.state() != TaskState::Completed || self.header.error().is_some() {
            return None;
        }
        // SAFETY: `Completed` is terminal and is stored after the body's last
        // mutable access; the `SeqCst` load above synchronizes with it.
        Some(unsafe { self.body.get().with(|ptr| &*ptr) })
    }
}

/// Type-erased interface the scheduler drives tasks through.
pub(crate) trait RawTask: Send + Sync {
    fn header(&self) -> &TaskHeader;

    /// Runs the body once. The caller must already have moved the task into
    /// `Executing`.
    fn execute(&self, scheduler: Option<&Handle>);

    fn query_dependencies(&self) -> Vec<TaskRef>;

    fn has_dynamic_dependencies(&self) -> bool;
}

impl<T: Task> RawTask for TaskCell<T> {
    fn header(&self) -> &TaskHeader {
        &self.header
    }

    fn execute(&self, scheduler: Option<&Handle>) {
        let cx = ExecContext {
            scheduler,
            header: &self.header,
        };
        // SAFETY: the `Executing` state was entered through a CAS by the caller,
        // so this is the only access to the body until `Completed` is stored.
        let outcome = catch_unwind(AssertUnwindSafe(|| unsafe {
            self.body.get_mut().with(|ptr| (*ptr).execute(&cx));
        }));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            debug!(task = ?self.header.id(), %message, "task body panicked");
            self.header.record_error(TaskError::Panicked(message));
        }
        self.header
            .transition(TaskState::Executing, TaskState::Completed);
    }

    fn query_dependencies(&self) -> Vec<TaskRef> {
        debug_assert!(
            self.header.state() <= TaskState::Pending,
            "dependencies queried after dispatch"
        );
        // SAFETY: before dispatch the body is only ever read.
        unsafe { self.body.get().with(|ptr| (*ptr).dependencies()) }
    }

    fn has_dynamic_dependencies(&self) -> bool {
        // SAFETY: see `query_dependencies`; only consulted before dispatch.
        unsafe { self.body.get().with(|ptr| (*ptr).has_dynamic_dependencies()) }
    }
}

/// Type-erased, reference-counted pointer to a task of any body type.
///
/// This is what [`Task::dependencies`] returns and what the scheduler's
/// queues and registry hold.
#[derive(Clone)]
pub struct TaskRef(pub(crate) Arc<dyn RawTask>);

impl TaskRef {
    pub(crate) fn header(&self) -> &TaskHeader {
        self.0.header()
    }

    /// ID assigned at first submission.
    #[must_use]
    pub fn id(&self) -> Option<TaskId> {
        self.header().id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.header().state()
    }

    /// Body finished and every piece of work it spawned finished too.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.header().is_executed()
    }

    /// Whether both refer to the same task.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskRef").field(self.header()).finish()
    }
}
