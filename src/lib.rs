//! Fork-join task scheduler.
//!
//! `spindle` runs closures on a fixed pool of worker threads, one FIFO queue
//! per worker, with try-lock work stealing between them. Three primitives sit
//! on top of the pool:
//!
//! - [`TaskGroup`] — fork an unbounded batch of tasks and `wait` for all of
//!   them. A worker that waits does not block; it keeps executing pool work
//!   ("helping wait"), so nested parallelism cannot deadlock.
//! - [`parallel_for`] — data-parallel loop over an index range, one task
//!   group per call, safe to nest to arbitrary depth.
//! - [`ThreadLocalStore`] / [`ThreadLocalBuffer`] — per-thread slots for
//!   scatter/gather accumulation without synchronization on the hot path.
//!
//! The free functions here go through the process-wide pool, which is built
//! lazily on first use and sized to the available hardware concurrency unless
//! overridden (see [`pool::Builder`] and the `SPINDLE_NUM_THREADS`
//! environment variable).
//!
//! ```no_run
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let hits: Vec<AtomicUsize> = (0..1024).map(|_| AtomicUsize::new(0)).collect();
//! spindle::parallel_for(0, hits.len(), |i| {
//!     hits[i].fetch_add(1, Ordering::Relaxed);
//! });
//! assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
//! ```

mod buffer;
mod context;
mod group;
mod parallel;
mod store;

// Public API
pub mod pool;
pub use pool::{Builder, TaskPool};

pub use buffer::ThreadLocalBuffer;
pub use group::TaskGroup;
pub use store::{LocalRef, ThreadLocalStore};

#[cfg(test)]
pub(crate) mod test_util;

/// Submits a fire-and-forget task to the global pool.
///
/// There is no handle to the result; use a [`TaskGroup`] when completion
/// matters. A panic inside `task` is caught and logged by the executing
/// worker, never crossing into other tasks.
pub fn submit<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    TaskPool::global().submit(task);
}

/// Invokes `body(i)` for every `i` in `[begin, end)` on the global pool.
///
/// Exactly one invocation per index. The calling thread participates in the
/// work and the call returns only once the whole range is done, so `body` may
/// borrow from the caller's stack. Nested calls are safe at any depth.
pub fn parallel_for<F>(begin: usize, end: usize, body: F)
where
    F: Fn(usize) + Sync,
{
    parallel::apply(TaskPool::global(), begin, end, body);
}

/// Number of worker threads in the global pool.
pub fn worker_count() -> usize {
    TaskPool::global().worker_count()
}

/// Index of the calling thread within the global pool, or `None` when called
/// from a thread the pool does not own.
pub fn current_worker() -> Option<usize> {
    TaskPool::global().current_worker()
}
