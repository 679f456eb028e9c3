use crate::{
    scheduler::{Handle, Stats, registry::Registry},
    spinlock::SpinLockGuard,
    task::{TaskRef, TaskState},
};
use std::sync::Arc;
use tracing::trace;

type RegistryGuard<'a> = SpinLockGuard<'a, Registry, false, false>;

impl Handle {
    /// Requests a scheduling slice and runs it if no other thread is.
    ///
    /// A thread that loses the try-lock leaves its request in `slices_owed`
    /// for the owner. The owner re-checks the counter after releasing the
    /// lock, so a request landing in between is not lost.
    pub(crate) fn scheduler_slice(&self) {
        Stats::bump(&self.shared.stats.slice_requests);
        self.shared.slices_owed.increment();
        if let Some(registry) = self.shared.registry.lock() {
            self.run_owed_slices(registry);
        }
    }

    /// Runs one pass per owed request as the slice owner, then releases the
    /// registry. Re-acquires it if a request arrived while releasing.
    fn run_owed_slices<'a>(&'a self, mut registry: RegistryGuard<'a>) {
        let owed = &self.shared.slices_owed;
        loop {
            while owed.get() > 0 {
                registry.with(|registry| self.slice_pass(registry));
                let remaining = owed.decrement();
                debug_assert!(remaining >= 0, "owed slice count went negative");
            }
            drop(registry);
            if owed.get() <= 0 {
                return;
            }
            match self.shared.registry.lock() {
                Some(next) => registry = next,
                None => return,
            }
        }
    }

    fn slice_pass(&self, registry: &mut Registry) {
        Stats::bump(&self.shared.stats.slice_passes);
        self.drain_pending(registry);
        let finalized = self.sweep(registry);
        trace!(tracked = registry.len(), finalized, "slice pass done");
        if finalized > 0 {
            // Completions can release join counters of tasks swept earlier in
            // this pass.
            self.shared.slices_owed.increment();
        }
    }

    /// Integrates every task waiting in the pending queue: dispatch it, link
    /// it into the registry, or both.
    fn drain_pending(&self, registry: &mut Registry) {
        while let Some(task) = self.shared.pending.dequeue() {
            let header = task.header();
            match header.state() {
                TaskState::Pending => {
                    let ready = self.dependencies_executed(&task);
                    if header.is_dependency() || !ready {
                        registry.insert(task.clone());
                    }
                    if ready {
                        self.schedule_task(task);
                    }
                }
                // Came back from a worker with spawned work still outstanding.
                TaskState::Completed => {
                    if header.is_executed() {
                        self.finalize(task);
                    } else {
                        registry.insert(task);
                    }
                }
                state => unreachable!("pending queue holds task {:?} in state {state:?}", task.id()),
            }
        }
    }

    /// Re-evaluates every linked task. Returns the number of finalized tasks.
    ///
    /// Tasks are unlinked before they are dispatched or finalized, so that a
    /// worker reading the `IsHashed` flag never sees a stale value.
    fn sweep(&self, registry: &mut Registry) -> usize {
        let mut dispatch = Vec::new();
        let mut finalize = Vec::new();
        registry.retain(|task| {
            let header = task.header();
            match header.state() {
                TaskState::Pending => {
                    if !self.dependencies_executed(task) {
                        return true;
                    }
                    dispatch.push(task.clone());
                    // Dependencies stay linked until their completion is
                    // observed here.
                    header.is_dependency()
                }
                TaskState::Completed if header.is_executed() => {
                    finalize.push(task.clone());
                    false
                }
                _ => true,
            }
        });
        for task in dispatch {
            self.schedule_task(task);
        }
        let finalized = finalize.len();
        for task in finalize {
            self.finalize(task);
        }
        finalized
    }

    fn dependencies_executed(&self, task: &TaskRef) -> bool {
        self.current_dependencies(task)
            .iter()
            .all(TaskRef::is_executed)
    }

    /// The cached dependency list, or a fresh one for tasks whose
    /// dependencies change over time. Newly listed tasks that were never
    /// submitted are submitted now.
    fn current_dependencies(&self, task: &TaskRef) -> Arc<[TaskRef]> {
        let header = task.header();
        if !task.0.has_dynamic_dependencies() {
            return header.cached_dependencies();
        }
        let dependencies: Arc<[TaskRef]> = task.0.query_dependencies().into();
        for dependency in dependencies.iter() {
            self.submit_dependency(dependency);
        }
        header.cache_dependencies(Arc::clone(&dependencies));
        dependencies
    }
}
