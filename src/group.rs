use crate::pool::{Shared, TaskPool};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// A fork-join handle: [`run`](TaskGroup::run) forks tasks into the pool,
/// [`wait`](TaskGroup::wait) joins the whole batch.
///
/// `wait` is deadlock-free under nesting: a pool worker that waits does not
/// idle, it keeps running pool work — including, transitively, the tasks the
/// group is waiting on. Only threads the pool does not own actually block.
///
/// A group is reusable: after `wait` returns (or re-raises a task panic) the
/// counter is back to zero and a fresh batch may be forked. Dropping a group
/// that still has outstanding tasks is a bug in the caller, checked in debug
/// builds.
///
/// ```no_run
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let mut group = spindle::TaskGroup::new();
/// for _ in 0..100 {
///     let hits = Arc::clone(&hits);
///     group.run(move || {
///         hits.fetch_add(1, Ordering::Relaxed);
///     });
/// }
/// group.wait();
/// assert_eq!(hits.load(Ordering::Relaxed), 100);
/// ```
pub struct TaskGroup {
    pool: Arc<Shared>,
    state: Arc<State>,
}

struct State {
    /// Tasks forked but not yet finished. Zero exactly when the batch has
    /// drained; never negative.
    outstanding: AtomicUsize,

    /// First panic payload raised by any task of the current batch. Later
    /// panics in the same batch are dropped.
    panic: Mutex<Option<Box<dyn Any + Send + 'static>>>,

    /// Off-pool waiters block here; the task that drops `outstanding` to zero
    /// notifies.
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl TaskGroup {
    /// A group that forks into the global pool.
    pub fn new() -> Self {
        Self::on(TaskPool::global())
    }

    /// A group that forks into a specific pool.
    pub fn on(pool: &TaskPool) -> Self {
        Self {
            pool: Arc::clone(pool.shared()),
            state: Arc::new(State {
                outstanding: AtomicUsize::new(0),
                panic: Mutex::new(None),
                idle_lock: Mutex::new(()),
                idle: Condvar::new(),
            }),
        }
    }

    /// Forks `task` into the pool as part of this group's current batch.
    pub fn run<F>(&mut self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.outstanding.fetch_add(1, Ordering::Relaxed);

        let state = Arc::clone(&self.state);
        self.pool.submit(Box::new(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                state.record_panic(payload);
            }
            state.complete_one();
        }));
    }

    /// Blocks until every task forked on this group has finished.
    ///
    /// On a pool worker this is a helping wait: the thread executes pending
    /// pool tasks (any group's) until the counter drains, yielding only when
    /// nothing at all is runnable. Off-pool threads block on a condvar.
    ///
    /// If any task of the batch panicked, the first payload is re-raised here
    /// exactly once; the group is reset either way.
    pub fn wait(&mut self) {
        if let Some(index) = self.pool.current_worker_index() {
            while self.state.outstanding.load(Ordering::Acquire) != 0 {
                if !self.pool.run_one(index) {
                    thread::yield_now();
                }
            }
        } else {
            let mut guard = self.state.idle_lock.lock();
            while self.state.outstanding.load(Ordering::Acquire) != 0 {
                self.state.idle.wait(&mut guard);
            }
        }

        if let Some(payload) = self.state.panic.lock().take() {
            panic::resume_unwind(payload);
        }
    }
}

impl State {
    fn record_panic(&self, payload: Box<dyn Any + Send + 'static>) {
        let mut slot = self.panic.lock();
        if slot.is_none() {
            *slot = Some(payload);
        }
    }

    fn complete_one(&self) {
        // AcqRel publishes this task's side effects to the joining thread.
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Take the waiter lock before notifying, so a waiter between its
            // counter check and its condvar wait cannot miss the wakeup.
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        // The wrappers keep `state` alive through their own Arcs, but
        // dropping the handle mid-batch is a caller bug.
        if !thread::panicking() {
            debug_assert_eq!(
                self.state.outstanding.load(Ordering::Acquire),
                0,
                "task group dropped while tasks are outstanding"
            );
        }
    }
}
