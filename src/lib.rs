//! Dependency-aware, multi-threaded task scheduler built on lock-free bounded
//! queues.
//!
//! A fixed pool of worker threads executes [`Task`](task::Task)s. A task may
//! declare dependencies; it is dispatched only once every dependency is fully
//! executed, meaning its body returned and every piece of work it spawned
//! completed too. Tasks may submit further tasks from inside their body,
//! which makes recursive fork-join workloads (parallel Fibonacci, tiled image
//! generation, parallel quicksort) straightforward.
//!
//! The hot path, handing an independent task to an idle worker, only touches
//! lock-free queues. Dependency resolution happens in the *scheduling slice*:
//! one serialized pass, run by whichever thread wins a try-lock, that
//! integrates newly submitted tasks and re-evaluates every task linked into a
//! hash-bucketed registry.
//!
//! Key modules:
//! - `scheduler`: the worker pool, submission API and scheduling slice.
//! - `task`: the `Task` trait, caller-owned `TaskHandle`s and the task
//!   lifecycle.
//! - `queue`, `spinlock`, `event`, `atomic`: the synchronization primitives
//!   the scheduler is built from.
//! - `config`: scheduler construction parameters.
//!
//! Quick start:
//! ```
//! use depsched::{
//!     scheduler::Scheduler,
//!     task::{ExecContext, Task, TaskHandle, TaskOptions},
//! };
//!
//! struct Square(u64);
//!
//! impl Task for Square {
//!     fn execute(&mut self, _cx: &ExecContext<'_>) {
//!         self.0 *= self.0;
//!     }
//! }
//!
//! let scheduler = Scheduler::new(Some(2)).unwrap();
//! let task = TaskHandle::with_options(Square(12), TaskOptions::new().with_wait_event());
//! scheduler.add_task(&task);
//! task.sync().unwrap();
//! assert_eq!(task.get().map(|square| square.0), Some(144));
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber.

/// Linearizable atomic words, the full memory barrier and shared join
/// counters.
pub mod atomic;
/// Scheduler construction parameters.
pub mod config;
/// Manual- and auto-reset waitable events.
pub mod event;
/// Bounded lock-free multi-producer/multi-consumer queue.
pub mod queue;
/// Worker pool, submission API and dependency resolution.
///
/// Independent tasks are handed straight to an idle worker (or the ready
/// queue); tasks with dependencies wait in a hash-bucketed registry that the
/// scheduling slice re-evaluates.
pub mod scheduler;
/// Compare-and-swap spinlocks with a type-level contention policy.
pub mod spinlock;
mod sync;
/// The `Task` trait, task handles and the task lifecycle.
pub mod task;
/// Common types: task IDs and internal cell wrappers.
pub mod types;
mod utils;
