use crate::task::TaskRef;
use core::fmt;

/// Dependency registry: tasks waiting on dependencies, and dependency tasks
/// tracked until their completion is observed. Keyed by `TaskId & mask`
/// with chained buckets.
///
/// Only touched by the thread that owns the scheduling slice.
pub(super) struct Registry {
    buckets: Box<[Vec<TaskRef>]>,
    mask: u64,
    len: usize,
}

impl Registry {
    pub(super) fn new(bucket_count: usize) -> Self {
        assert!(
            bucket_count.is_power_of_two(),
            "Registry::new: bucket count {bucket_count} is not a power of two"
        );
        Self {
            buckets: (0..bucket_count).map(|_| Vec::new()).collect(),
            mask: bucket_count as u64 - 1,
            len: 0,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Links `task` into its bucket and sets its `IsHashed` flag.
    pub(super) fn insert(&mut self, task: TaskRef) {
        let id = task.id().expect("Registry::insert: task without an id");
        task.header().set_hashed();
        let bucket = usize::try_from(id.get() & self.mask).expect("Registry::insert: [1]");
        self.buckets[bucket].push(task);
        self.len += 1;
    }

    /// Visits every linked task. `visit` returns `false` to unlink the task,
    /// which clears its `IsHashed` flag.
    pub(super) fn retain(&mut self, mut visit: impl FnMut(&TaskRef) -> bool) {
        let mut unlinked = 0;
        for bucket in &mut self.buckets {
            bucket.retain(|task| {
                if visit(task) {
                    true
                } else {
                    task.header().clear_hashed();
                    unlinked += 1;
                    false
                }
            });
        }
        self.len -= unlinked;
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("buckets", &self.buckets.len())
            .field("len", &self.len)
            .finish()
    }
}
