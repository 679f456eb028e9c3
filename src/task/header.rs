use crate::{
    atomic::{AtomicCursor, JoinCounter},
    event::{Event, ResetMode},
    sync::*,
    task::{Ownership, TaskError, TaskOptions, TaskRef},
    types::TaskId,
};
use core::fmt;
use std::sync::Arc;

/// Lifecycle of a task.
///
/// Submitted tasks walk `Unsubmitted → Pending → Ready → Dispatched →
/// Executing → Completed`; a task run inline skips straight from
/// `Unsubmitted` to `Executing`. Every edge is taken with a compare-and-swap,
/// so a second submission or a second execution is detected instead of
/// silently racing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Constructed, not yet handed to a scheduler.
    Unsubmitted = 0,
    /// Submitted; waiting in the pending queue or the dependency registry.
    Pending = 1,
    /// All dependencies executed; parked in the ready queue or about to be
    /// handed to an idle worker.
    Ready = 2,
    /// Assigned to a worker thread.
    Dispatched = 3,
    /// Body is running.
    Executing = 4,
    /// Body returned (or panicked). Spawned children may still be running;
    /// see [`TaskHandle::is_executed`](crate::task::TaskHandle::is_executed).
    Completed = 5,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unsubmitted,
            1 => Self::Pending,
            2 => Self::Ready,
            3 => Self::Dispatched,
            4 => Self::Executing,
            5 => Self::Completed,
            _ => unreachable!("TaskState::from_u8: {raw}"),
        }
    }
}

const IS_DEPENDENCY: u8 = 1 << 0;
const IS_HASHED: u8 = 1 << 1;
const FINALIZED: u8 = 1 << 2;

/// Scheduler-visible bookkeeping shared by every task regardless of its body
/// type.
pub(crate) struct TaskHeader {
    /// `0` until the first submission.
    id: AtomicU64,
    state: AtomicU8,
    flags: AtomicU8,
    ownership: Ownership,
    /// Outstanding work spawned on behalf of this task.
    sync_counter: JoinCounter,
    /// External counter decremented on completion. Not owned by the task.
    exec_counter: Option<JoinCounter>,
    wait_event: Option<Event>,
    error: Mutex<Option<TaskError>>,
    /// Dependency list captured at submission.
    dependencies: Mutex<Arc<[TaskRef]>>,
}

impl TaskHeader {
    pub(crate) fn new(options: TaskOptions, ownership: Ownership) -> Self {
        let TaskOptions {
            wait_event,
            exec_counter,
        } = options;
        assert!(
            !(wait_event && ownership == Ownership::Scheduler),
            "a scheduler-owned task cannot carry a wait event"
        );
        if let Some(counter) = &exec_counter {
            counter.increment();
        }
        Self {
            id: AtomicU64::new(0),
            state: AtomicU8::new(TaskState::Unsubmitted as u8),
            flags: AtomicU8::new(0),
            ownership,
            sync_counter: JoinCounter::new(),
            exec_counter,
            wait_event: wait_event.then(|| Event::new(ResetMode::Manual)),
            error: Mutex::new(None),
            dependencies: Mutex::new(Arc::from([])),
        }
    }

    pub(crate) fn id(&self) -> Option<TaskId> {
        TaskId::new(self.id.load(Ordering::SeqCst))
    }

    /// Assigns an ID from `ids` unless one was assigned already.
    pub(crate) fn assign_id(&self, ids: &AtomicCursor) -> TaskId {
        if let Some(id) = self.id() {
            return id;
        }
        let fresh = ids.increment() as u64;
        match self
            .id
            .compare_exchange(0, fresh, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => TaskId::new(fresh),
            Err(existing) => TaskId::new(existing),
        }
        .expect("TaskHeader::assign_id: zero id")
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn try_transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// # Panics
    /// If the task is not in state `from`.
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) {
        if !self.try_transition(from, to) {
            panic!(
                "task {:?}: illegal transition {from:?} -> {to:?} from state {:?}",
                self.id(),
                self.state()
            );
        }
    }

    /// Has been handed to a worker or queued as ready.
    pub(crate) fn is_scheduled(&self) -> bool {
        self.state() >= TaskState::Ready
    }

    /// Body finished and no spawned work is outstanding.
    pub(crate) fn is_executed(&self) -> bool {
        self.state() == TaskState::Completed && self.sync_counter.is_zero()
    }

    fn has_flag(&self, flag: u8) -> bool {
        self.flags.load(Ordering::SeqCst) & flag != 0
    }

    /// Returns whether the flag was already set.
    fn set_flag(&self, flag: u8) -> bool {
        self.flags.fetch_or(flag, Ordering::SeqCst) & flag != 0
    }

    fn clear_flag(&self, flag: u8) -> bool {
        self.flags.fetch_and(!flag, Ordering::SeqCst) & flag != 0
    }

    pub(crate) fn is_dependency(&self) -> bool {
        self.has_flag(IS_DEPENDENCY)
    }

    pub(crate) fn mark_dependency(&self) {
        self.set_flag(IS_DEPENDENCY);
    }

    pub(crate) fn is_hashed(&self) -> bool {
        self.has_flag(IS_HASHED)
    }

    pub(crate) fn set_hashed(&self) {
        let was_hashed = self.set_flag(IS_HASHED);
        assert!(!was_hashed, "task {:?} hashed twice", self.id());
    }

    pub(crate) fn clear_hashed(&self) {
        let was_hashed = self.clear_flag(IS_HASHED);
        assert!(was_hashed, "task {:?} unhashed twice", self.id());
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.has_flag(FINALIZED)
    }

    pub(crate) fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub(crate) fn sync_counter(&self) -> &JoinCounter {
        &self.sync_counter
    }

    pub(crate) fn exec_counter(&self) -> Option<&JoinCounter> {
        self.exec_counter.as_ref()
    }

    pub(crate) fn wait_event(&self) -> Option<&Event> {
        self.wait_event.as_ref()
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        self.error.lock().clone()
    }

    pub(crate) fn record_error(&self, error: TaskError) {
        *self.error.lock() = Some(error);
    }

    pub(crate) fn cached_dependencies(&self) -> Arc<[TaskRef]> {
        Arc::clone(&self.dependencies.lock())
    }

    pub(crate) fn cache_dependencies(&self, dependencies: Arc<[TaskRef]>) {
        *self.dependencies.lock() = dependencies;
    }

    /// Completion side effects: decrement the exec counter and release
    /// waiters. Runs exactly once per task. Returns whether the exec counter
    /// dropped to zero.
    pub(crate) fn fire_completion(&self) -> bool {
        let already = self.set_flag(FINALIZED);
        assert!(!already, "task {:?}: completion fired twice", self.id());
        let released = self
            .exec_counter
            .as_ref()
            .is_some_and(|counter| counter.decrement() == 0);
        if let Some(event) = &self.wait_event {
            event.trigger();
        }
        released
    }
}

impl fmt::Debug for TaskHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHeader")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("ownership", &self.ownership)
            .field("is_dependency", &self.is_dependency())
            .field("is_hashed", &self.is_hashed())
            .field("finalized", &self.is_finalized())
            .field("sync_counter", &self.sync_counter)
            .finish_non_exhaustive()
    }
}
