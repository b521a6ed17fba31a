//! The worker-thread pool: a fixed set of OS threads, one FIFO queue per
//! worker, round-robin submission and try-lock work stealing between queues.

use crate::context;
use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, error};

mod builder;
pub use builder::Builder;
pub(crate) use builder::PoolConfig;

mod queue;
pub(crate) use queue::{Popped, Task, WorkerQueue};

mod worker;

#[cfg(test)]
mod tests;

static GLOBAL: OnceLock<TaskPool> = OnceLock::new();

/// Monotonic pool id, so worker identities from distinct pools never alias.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// A fixed-size pool of worker threads.
///
/// Most callers never construct one: [`TaskPool::global`] lazily builds a
/// process-wide pool sized to the hardware (or the `SPINDLE_NUM_THREADS`
/// override) on first use, and that pool lives until the process exits.
/// Explicit pools built through [`Builder`] shut down on drop: queues are
/// closed, every already-queued task still runs, and the worker threads are
/// joined.
pub struct TaskPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// State shared between the pool handle, its workers, and task groups.
pub(crate) struct Shared {
    id: u64,
    queues: Vec<WorkerQueue>,

    /// Round-robin destination for `submit`, bumped atomically by every
    /// submitting thread.
    next_queue: AtomicUsize,

    /// Cleared at the start of shutdown, before the queues close.
    accepting: AtomicBool,
}

impl TaskPool {
    /// The process-wide pool, constructed on first use.
    ///
    /// Construction failure (the OS refusing to spawn threads) is fatal here;
    /// build an explicit pool with [`Builder::try_build`] to handle it.
    pub fn global() -> &'static TaskPool {
        GLOBAL.get_or_init(|| {
            let mut builder = Builder::new();
            if let Some(n) = builder::env_worker_threads() {
                builder = builder.worker_threads(n);
            }
            builder
                .try_build()
                .expect("failed to construct the global task pool")
        })
    }

    pub(crate) fn try_new(cfg: PoolConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            queues: (0..cfg.worker_threads).map(|_| WorkerQueue::new()).collect(),
            next_queue: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
        });

        let mut handles = Vec::with_capacity(cfg.worker_threads);
        for index in 0..cfg.worker_threads {
            match spawn_worker(&cfg, Arc::clone(&shared), index) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // No partial pool: unwind the workers spawned so far and
                    // surface the error to the caller.
                    shared.accepting.store(false, Ordering::Release);
                    for queue in &shared.queues {
                        queue.quit();
                    }
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        debug!(pool = shared.id, workers = cfg.worker_threads, "task pool started");

        Ok(TaskPool {
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Submits a fire-and-forget task.
    ///
    /// Destination queues rotate round-robin across all submitting threads;
    /// workers may submit like anyone else. A panic inside `task` is caught
    /// and logged by the executing worker.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(Box::new(task));
    }

    /// Number of worker threads owned by this pool.
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count()
    }

    /// Index of the calling thread within this pool, in `[0, worker_count)`,
    /// or `None` when the calling thread is not one of this pool's workers.
    pub fn current_worker(&self) -> Option<usize> {
        self.shared.current_worker_index()
    }

    /// Invokes `body(i)` for every `i` in `[begin, end)` on this pool. See
    /// [`crate::parallel_for`].
    pub fn parallel_for<F>(&self, begin: usize, end: usize, body: F)
    where
        F: Fn(usize) + Sync,
    {
        crate::parallel::apply(self, begin, end, body);
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    fn shutdown(&self) {
        // Stop accepting first so a straggling `submit` trips the queue's
        // closed assert instead of racing the joins below.
        self.shared.accepting.store(false, Ordering::Release);
        for queue in &self.shared.queues {
            queue.quit();
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        let panicked = handles
            .into_iter()
            .filter_map(|handle| handle.join().err())
            .count();
        if panicked > 0 {
            error!(pool = self.shared.id, panicked, "worker thread(s) panicked");
        }

        // Workers drain their queues before exiting, so anything left behind
        // means a caller kept forking past shutdown.
        debug_assert!(
            self.shared.queues.iter().all(WorkerQueue::is_empty),
            "tasks left unexecuted at pool shutdown"
        );

        debug!(pool = self.shared.id, "task pool stopped");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    pub(crate) fn worker_count(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn current_worker_index(&self) -> Option<usize> {
        context::current_worker()
            .filter(|worker| worker.pool == self.id)
            .map(|worker| worker.index)
    }

    pub(crate) fn submit(&self, task: Task) {
        debug_assert!(
            self.accepting.load(Ordering::Acquire),
            "submit on a pool that is shutting down"
        );
        let target = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        self.queues[target].push(task);
    }

    /// One work-finding step for worker `index`: its own queue first, then a
    /// single rotating sweep over the other queues starting just after it.
    /// `Busy` queues are skipped; one full sweep bounds stealing latency.
    fn find_task(&self, index: usize) -> Option<Task> {
        let n = self.queues.len();
        for offset in 0..n {
            if let Popped::Task(task) = self.queues[(index + offset) % n].try_pop() {
                return Some(task);
            }
        }
        None
    }

    /// Finds and runs one pending task from anywhere in the pool. Used by the
    /// worker loop and by workers helping inside `TaskGroup::wait`.
    pub(crate) fn run_one(&self, index: usize) -> bool {
        match self.find_task(index) {
            Some(task) => {
                worker::execute(task);
                true
            }
            None => false,
        }
    }

    fn own_queue(&self, index: usize) -> &WorkerQueue {
        &self.queues[index]
    }
}

fn spawn_worker(
    cfg: &PoolConfig,
    shared: Arc<Shared>,
    index: usize,
) -> Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new().name((cfg.thread_name.0)());
    if let Some(stack_size) = cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    builder
        .spawn(move || worker::run(shared, index))
        .with_context(|| format!("failed to spawn worker thread {}", index))
}
