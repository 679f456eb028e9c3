use crate::scheduler::SchedulerError;

/// Default capacity of the pending-tasks and ready-tasks queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 65_536;
/// Default number of dependency-registry hash buckets.
pub const DEFAULT_BUCKET_COUNT: usize = 1_024;

const DEFAULT_THREAD_NAME_PREFIX: &str = "depsched-worker";

/// Construction parameters of a [`Scheduler`](crate::scheduler::Scheduler).
///
/// ```
/// use depsched::config::SchedulerConfig;
///
/// let config = SchedulerConfig::new()
///     .worker_threads(2)
///     .ready_queue_capacity(1_024)
///     .thread_name_prefix("render");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct SchedulerConfig {
    /// `None` uses the number of logical processors.
    pub(crate) worker_threads: Option<usize>,
    pub(crate) pending_queue_capacity: usize,
    pub(crate) ready_queue_capacity: usize,
    pub(crate) bucket_count: usize,
    /// Workers are named `{prefix}-{index}`.
    pub(crate) thread_name_prefix: String,
    pub(crate) thread_stack_size: Option<usize>,
}

impl SchedulerConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            pending_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ready_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            bucket_count: DEFAULT_BUCKET_COUNT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            thread_stack_size: None,
        }
    }

    /// Sets the number of worker threads.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Capacity of the queue holding submitted tasks awaiting a scheduling
    /// slice. Rounded up to a power of two.
    pub fn pending_queue_capacity(mut self, capacity: usize) -> Self {
        self.pending_queue_capacity = capacity;
        self
    }

    /// Capacity of the queue holding ready tasks while every worker is busy.
    /// Rounded up to a power of two. Overflowing it is fatal.
    pub fn ready_queue_capacity(mut self, capacity: usize) -> Self {
        self.ready_queue_capacity = capacity;
        self
    }

    /// Number of dependency-registry buckets; must be a power of two.
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count;
        self
    }

    /// Prefix of the worker thread names.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Stack size in bytes of each worker thread.
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }

    /// Worker count after resolving the default.
    #[must_use]
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(crate::utils::default_worker_count)
    }

    /// Checks the parameters without spawning anything.
    ///
    /// # Errors
    /// If the worker count or a queue capacity is zero, or the bucket count is
    /// not a power of two.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.resolved_worker_threads() == 0 {
            return Err(SchedulerError::NoWorkers);
        }
        if !self.bucket_count.is_power_of_two() {
            return Err(SchedulerError::BucketCountNotPowerOfTwo(self.bucket_count));
        }
        for (queue, capacity) in [
            ("pending-tasks", self.pending_queue_capacity),
            ("ready-tasks", self.ready_queue_capacity),
        ] {
            if capacity == 0 {
                return Err(SchedulerError::QueueCapacityTooSmall { queue, capacity });
            }
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
