mod header;
mod raw;

pub use crate::task::{header::TaskState, raw::TaskRef};
pub(crate) use crate::task::{
    header::TaskHeader,
    raw::{RawTask, TaskCell},
};
use crate::{atomic::JoinCounter, scheduler::Handle, types::TaskId};
use core::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A unit of schedulable work.
///
/// `execute` runs exactly once, on a worker thread when the task was
/// submitted to a [`Scheduler`](crate::scheduler::Scheduler), or on the
/// calling thread through [`TaskHandle::run_inline`]. It may submit further
/// tasks through [`ExecContext::scheduler`].
pub trait Task: Send + Sync + 'static {
    /// The task's work.
    fn execute(&mut self, cx: &ExecContext<'_>);

    /// Tasks that must be executed before this one may run.
    ///
    /// Queried once at submission; the returned tasks that were never
    /// submitted are submitted along with this one.
    fn dependencies(&self) -> Vec<TaskRef> {
        Vec::new()
    }

    /// Whether `dependencies` must be queried again each time the scheduler
    /// re-evaluates the task, instead of using the list captured at
    /// submission.
    fn has_dynamic_dependencies(&self) -> bool {
        false
    }
}

/// Who releases the task once it is fully executed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Only the scheduler holds the task; it is dropped right after its
    /// completion side effects run.
    Scheduler,
    /// The producer holds a [`TaskHandle`] and decides when to drop it.
    Caller,
}

/// Construction options of a task.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct TaskOptions {
    pub(crate) wait_event: bool,
    pub(crate) exec_counter: Option<JoinCounter>,
}

impl TaskOptions {
    /// No wait event, no exec counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a completion event so that [`TaskHandle::sync`] can block.
    pub fn with_wait_event(mut self) -> Self {
        self.wait_event = true;
        self
    }

    /// Register one unit of work on `counter`; completion releases it.
    pub fn with_exec_counter(mut self, counter: JoinCounter) -> Self {
        self.exec_counter = Some(counter);
        self
    }
}

/// Failure recorded for a task whose body did not return normally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TaskError {
    /// The body panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// What a running task can see of its environment.
pub struct ExecContext<'a> {
    pub(crate) scheduler: Option<&'a Handle>,
    pub(crate) header: &'a TaskHeader,
}

impl<'a> ExecContext<'a> {
    /// The scheduler running this task, or `None` when it runs inline.
    #[must_use]
    pub fn scheduler(&self) -> Option<&'a Handle> {
        self.scheduler
    }

    /// This task's own join counter. Children constructed with it as their
    /// exec counter keep this task from being fully executed until they
    /// complete.
    #[must_use]
    pub fn join_counter(&self) -> &'a JoinCounter {
        self.header.sync_counter()
    }

    /// External counter this task was constructed with.
    #[must_use]
    pub fn exec_counter(&self) -> Option<&'a JoinCounter> {
        self.header.exec_counter()
    }

    /// Counter that children should join: the exec counter when there is
    /// one, so that every descendant reports to the same root, otherwise this
    /// task's own join counter.
    #[must_use]
    pub fn completion_counter(&self) -> JoinCounter {
        self.exec_counter()
            .unwrap_or_else(|| self.join_counter())
            .clone()
    }

    /// ID of the running task, if it was submitted to a scheduler.
    #[must_use]
    pub fn task_id(&self) -> Option<TaskId> {
        self.header.id()
    }
}

impl fmt::Debug for ExecContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("inline", &self.scheduler.is_none())
            .field("task", self.header)
            .finish()
    }
}

/// Caller-owned handle to a task.
///
/// The handle keeps the task alive after it executed, so its body can be
/// inspected through [`get`](Self::get).
pub struct TaskHandle<T: Task> {
    cell: Arc<TaskCell<T>>,
}

impl<T: Task> TaskHandle<T> {
    /// Wraps `body` with default options.
    pub fn new(body: T) -> Self {
        Self::with_options(body, TaskOptions::new())
    }

    /// Wraps `body`. An exec counter in `options` is incremented here.
    pub fn with_options(body: T, options: TaskOptions) -> Self {
        Self {
            cell: Arc::new(TaskCell::new(
                TaskHeader::new(options, Ownership::Caller),
                body,
            )),
        }
    }

    /// Runs the task to completion on the calling thread, without a
    /// scheduler.
    ///
    /// Completion side effects fire when nothing spawned by the body is still
    /// outstanding.
    ///
    /// # Panics
    /// If the task was already submitted or executed.
    pub fn run_inline(&self) {
        let header = &self.cell.header;
        header.transition(TaskState::Unsubmitted, TaskState::Executing);
        self.cell.execute(None);
        if header.is_executed() {
            header.fire_completion();
        }
    }

    /// Blocks until the task is fully executed.
    ///
    /// # Errors
    /// The failure recorded for the task, if its body panicked.
    ///
    /// # Panics
    /// If the task was not created with [`TaskOptions::with_wait_event`].
    pub fn sync(&self) -> Result<(), TaskError> {
        self.cell
            .header
            .wait_event()
            .expect("sync() requires a task created with a wait event")
            .wait();
        self.error().map_or(Ok(()), Err)
    }

    /// Body finished and every piece of work it spawned finished too.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.cell.header.is_executed()
    }

    /// Has been handed to a worker or queued as ready.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.cell.header.is_scheduled()
    }

    /// Completion side effects have fired.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.cell.header.is_finalized()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.cell.header.state()
    }

    /// The body, once it returned normally.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.cell.completed_body()
    }

    /// The failure recorded for the task, if any.
    #[must_use]
    pub fn error(&self) -> Option<TaskError> {
        self.cell.header.error()
    }

    /// This task's own join counter.
    #[must_use]
    pub fn join_counter(&self) -> JoinCounter {
        self.cell.header.sync_counter().clone()
    }

    /// ID assigned at first submission.
    #[must_use]
    pub fn id(&self) -> Option<TaskId> {
        self.cell.header.id()
    }

    /// Type-erased reference, e.g. for [`Task::dependencies`].
    #[must_use]
    pub fn as_task_ref(&self) -> TaskRef {
        TaskRef(Arc::clone(&self.cell) as Arc<dyn RawTask>)
    }
}

impl<T: Task> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Task> From<&TaskHandle<T>> for TaskRef {
    fn from(handle: &TaskHandle<T>) -> Self {
        handle.as_task_ref()
    }
}

impl<T: Task> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.cell.header).finish()
    }
}
