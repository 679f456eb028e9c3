mod registry;
mod slice;
mod worker;

use crate::{
    atomic::{AtomicCursor, AtomicWord},
    config::SchedulerConfig,
    queue::BoundedQueue,
    scheduler::{registry::Registry, worker::WorkerThread},
    spinlock::{TrySpinLock, YieldingSpinLock},
    sync::*,
    task::{Ownership, Task, TaskCell, TaskHandle, TaskHeader, TaskOptions, TaskRef, TaskState},
    types::CachePadded,
};
use core::fmt;
use derive_more::{Debug, Deref};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{error, info, trace};

/// Error returned when a [`Scheduler`] cannot be constructed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    /// The worker count resolved to zero.
    #[error("scheduler needs at least one worker thread")]
    NoWorkers,
    /// The registry bucket count must be a power of two.
    #[error("bucket count {0} is not a power of two")]
    BucketCountNotPowerOfTwo(usize),
    /// A task queue was configured without room for a single task.
    #[error("{queue} queue capacity {capacity} is too small")]
    QueueCapacityTooSmall {
        /// Which queue.
        queue: &'static str,
        /// The rejected capacity.
        capacity: usize,
    },
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn a worker thread")]
    Spawn(#[source] io::Error),
}

/// Fixed pool of worker threads executing [`Task`]s once their dependencies
/// are executed.
///
/// Dereferences to [`Handle`], which carries the submission API. Dropping the
/// scheduler stops and joins the workers; see [`Scheduler::shutdown`].
#[derive(Debug, Deref)]
#[must_use]
pub struct Scheduler {
    #[deref]
    handle: Handle,
    #[debug(skip)]
    threads: Vec<thread::JoinHandle<()>>,
}

/// Cheap, cloneable submission handle shared by the scheduler, its workers
/// and every running task.
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

struct Shared {
    workers: Box<[WorkerThread]>,
    /// Submitted tasks (and executed tasks with outstanding children)
    /// waiting for the next scheduling slice.
    pending: BoundedQueue<TaskRef>,
    /// Ready tasks waiting for a worker.
    ready: BoundedQueue<TaskRef>,
    /// Indices of workers waiting for a task.
    idle: BoundedQueue<usize>,
    /// Makes "pop ready or register idle" and "pop idle or push ready"
    /// atomic with respect to each other, so that a ready task never waits
    /// while a worker idles.
    queues_lock: YieldingSpinLock<()>,
    /// Held by the thread running the scheduling slice.
    registry: TrySpinLock<Registry>,
    slices_owed: CachePadded<AtomicWord>,
    next_task_id: AtomicCursor,
    stop: AtomicBool,
    stats: Stats,
}

/// Snapshot of the scheduler's counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct SchedulerStats {
    /// Tasks that went through submission, dependencies included.
    pub tasks_submitted: u64,
    /// Submissions dispatched without a scheduling slice.
    pub direct_dispatches: u64,
    /// Submissions routed through the pending queue.
    pub deferred_submissions: u64,
    /// Tasks moved to the ready state.
    pub tasks_scheduled: u64,
    /// Scheduling slices requested.
    pub slice_requests: u64,
    /// Slice passes actually run.
    pub slice_passes: u64,
    /// Tasks whose completion side effects fired.
    pub tasks_finalized: u64,
    /// Task bodies that panicked.
    pub task_panics: u64,
}

struct Stats {
    tasks_submitted: AtomicU64,
    direct_dispatches: AtomicU64,
    deferred_submissions: AtomicU64,
    tasks_scheduled: AtomicU64,
    slice_requests: AtomicU64,
    slice_passes: AtomicU64,
    tasks_finalized: AtomicU64,
    task_panics: AtomicU64,
}

impl Stats {
    fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            direct_dispatches: AtomicU64::new(0),
            deferred_submissions: AtomicU64::new(0),
            tasks_scheduled: AtomicU64::new(0),
            slice_requests: AtomicU64::new(0),
            slice_passes: AtomicU64::new(0),
            tasks_finalized: AtomicU64::new(0),
            task_panics: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        SchedulerStats {
            tasks_submitted: load(&self.tasks_submitted),
            direct_dispatches: load(&self.direct_dispatches),
            deferred_submissions: load(&self.deferred_submissions),
            tasks_scheduled: load(&self.tasks_scheduled),
            slice_requests: load(&self.slice_requests),
            slice_passes: load(&self.slice_passes),
            tasks_finalized: load(&self.tasks_finalized),
            task_panics: load(&self.task_panics),
        }
    }
}

impl Scheduler {
    /// Starts `worker_threads` workers, or one per logical processor.
    ///
    /// # Errors
    /// See [`Scheduler::with_config`].
    pub fn new(worker_threads: Option<usize>) -> Result<Self, SchedulerError> {
        let config = SchedulerConfig::new();
        let config = match worker_threads {
            Some(count) => config.worker_threads(count),
            None => config,
        };
        Self::with_config(config)
    }

    /// Starts a scheduler described by `config`. Every worker starts idle.
    ///
    /// # Errors
    /// If `config` is invalid or a worker thread cannot be spawned.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let num_workers = config.resolved_worker_threads();
        let shared = Shared {
            workers: (0..num_workers).map(|_| WorkerThread::new()).collect(),
            pending: BoundedQueue::new(config.pending_queue_capacity),
            ready: BoundedQueue::new(config.ready_queue_capacity),
            idle: BoundedQueue::new(num_workers),
            queues_lock: YieldingSpinLock::new(()),
            registry: TrySpinLock::new(Registry::new(config.bucket_count)),
            slices_owed: CachePadded::new(AtomicWord::new(0)),
            next_task_id: AtomicCursor::new(0),
            stop: AtomicBool::new(false),
            stats: Stats::new(),
        };
        let mut scheduler = Self {
            handle: Handle {
                shared: Arc::new(shared),
            },
            threads: Vec::with_capacity(num_workers),
        };
        for index in 0..num_workers {
            let mut builder =
                thread::Builder::new().name(format!("{}-{index}", config.thread_name_prefix));
            if let Some(stack_size) = config.thread_stack_size {
                builder = builder.stack_size(stack_size);
            }
            let handle = scheduler.handle.clone();
            match builder.spawn(move || worker::run(&handle, index)) {
                Ok(thread) => scheduler.threads.push(thread),
                Err(err) => {
                    error!(index, %err, "failed to spawn worker thread");
                    scheduler.shutdown();
                    return Err(SchedulerError::Spawn(err));
                }
            }
        }
        info!(
            workers = num_workers,
            "scheduler initialized using {num_workers} worker threads"
        );
        Ok(scheduler)
    }

    /// Stops and joins every worker.
    ///
    /// A worker first finishes the task it is running and any ready task it
    /// picks up right after. Tasks that have not been dispatched by then are
    /// dropped without running, so a `sync` on them never returns. Idempotent;
    /// also run on drop.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        let shared = &self.handle.shared;
        shared.stop.store(true, Ordering::SeqCst);
        for worker in &shared.workers {
            worker.wake();
        }
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!("worker thread terminated by a panic");
            }
        }
        info!(stats = ?shared.stats.snapshot(), "scheduler stopped");
    }

    /// A handle that outlives borrows of the scheduler, e.g. to move into
    /// another thread.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Handle {
    /// Submits a caller-owned task.
    ///
    /// Dependencies that were never submitted are submitted first. The task
    /// is dispatched right away when it has no dependencies and no other task
    /// depends on it; otherwise it waits for a scheduling slice.
    ///
    /// # Panics
    /// If the task was already submitted or run inline.
    pub fn add_task<T: Task>(&self, task: &TaskHandle<T>) {
        self.add_task_ref(task.as_task_ref());
    }

    /// Submits a type-erased task. See [`add_task`](Self::add_task).
    ///
    /// # Panics
    /// If the task was already submitted or run inline.
    pub fn add_task_ref(&self, task: TaskRef) {
        task.header()
            .transition(TaskState::Unsubmitted, TaskState::Pending);
        self.submit(task);
    }

    /// Submits a scheduler-owned task. The scheduler drops it right after its
    /// completion side effects run; results must be published through the
    /// body's own shared state or an exec counter.
    ///
    /// # Panics
    /// If `options` requests a wait event: nobody could wait on it.
    pub fn spawn<T: Task>(&self, body: T, options: TaskOptions) {
        let cell = TaskCell::new(TaskHeader::new(options, Ownership::Scheduler), body);
        self.add_task_ref(TaskRef(Arc::new(cell)));
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.shared.workers.len()
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats.snapshot()
    }

    /// Submission of a task already moved to `Pending`.
    fn submit(&self, task: TaskRef) {
        let header = task.header();
        let id = header.assign_id(&self.shared.next_task_id);
        Stats::bump(&self.shared.stats.tasks_submitted);
        let dependencies: Arc<[TaskRef]> = task.0.query_dependencies().into();
        for dependency in dependencies.iter() {
            self.submit_dependency(dependency);
        }
        let independent = dependencies.is_empty();
        header.cache_dependencies(dependencies);
        if independent && !header.is_dependency() {
            trace!(task = id.get(), "direct dispatch");
            Stats::bump(&self.shared.stats.direct_dispatches);
            self.schedule_task(task);
        } else {
            trace!(task = id.get(), "deferred to the scheduling slice");
            Stats::bump(&self.shared.stats.deferred_submissions);
            self.shared.pending.enqueue_or_abort(task, "pending-tasks");
            self.scheduler_slice();
        }
    }

    /// Marks `dependency` as depended upon and submits it if nobody did yet.
    fn submit_dependency(&self, dependency: &TaskRef) {
        let header = dependency.header();
        header.mark_dependency();
        if header.try_transition(TaskState::Unsubmitted, TaskState::Pending) {
            self.submit(dependency.clone());
        }
    }

    /// Hands a task whose dependencies are executed to an idle worker, or
    /// parks it in the ready queue.
    fn schedule_task(&self, task: TaskRef) {
        task.header()
            .transition(TaskState::Pending, TaskState::Ready);
        Stats::bump(&self.shared.stats.tasks_scheduled);
        if let Some((worker, task)) = self.next_idle_thread(task) {
            trace!(task = ?task.id(), worker, "assigned to idle worker");
            self.shared.workers[worker].set_task(task);
        }
    }

    fn next_idle_thread(&self, task: TaskRef) -> Option<(usize, TaskRef)> {
        let _guard = self.shared.queues_lock.lock();
        if let Some(worker) = self.shared.idle.dequeue() {
            Some((worker, task))
        } else {
            self.shared.ready.enqueue_or_abort(task, "ready-tasks");
            None
        }
    }

    /// Pops a ready task for `worker`, or registers it as idle.
    fn next_ready_task(&self, worker: usize) -> Option<TaskRef> {
        let _guard = self.shared.queues_lock.lock();
        if let Some(task) = self.shared.ready.dequeue() {
            task.header()
                .transition(TaskState::Ready, TaskState::Dispatched);
            Some(task)
        } else {
            self.shared.idle.enqueue_or_abort(worker, "idle-threads");
            None
        }
    }

    /// Runs a dispatched task on the current worker and routes it to
    /// finalization.
    fn trigger(&self, task: TaskRef) {
        let header = task.header();
        header.transition(TaskState::Dispatched, TaskState::Executing);
        // A task linked into the registry before dispatch stays linked until
        // the slice finalizes it.
        let tracked = header.is_hashed();
        task.0.execute(Some(self));
        if header.error().is_some() {
            Stats::bump(&self.shared.stats.task_panics);
        }
        if tracked {
            self.scheduler_slice();
        } else if header.is_executed() {
            if self.finalize(task) {
                // The released counter may be all a linked parent waits on.
                self.scheduler_slice();
            }
        } else {
            trace!(task = ?header.id(), sync_counter = header.sync_counter().get(), "awaiting children");
            self.shared.pending.enqueue_or_abort(task, "pending-tasks");
            self.scheduler_slice();
        }
    }

    /// Fires completion side effects and releases the scheduler's reference.
    /// Returns whether the task's exec counter dropped to zero.
    fn finalize(&self, task: TaskRef) -> bool {
        let header = task.header();
        let released = header.fire_completion();
        Stats::bump(&self.shared.stats.tasks_finalized);
        trace!(task = ?header.id(), ownership = ?header.ownership(), "task finalized");
        if header.ownership() == Ownership::Scheduler {
            debug_assert_eq!(
                task.strong_count(),
                1,
                "scheduler-owned task referenced outside the scheduler"
            );
            drop(task);
        }
        released
    }

    fn is_stopping(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("workers", &self.num_workers())
            .field("pending", &self.shared.pending)
            .field("ready", &self.shared.ready)
            .field("registry", &self.shared.registry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
