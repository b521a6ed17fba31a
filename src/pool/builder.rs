use crate::pool::TaskPool;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::warn;

/// Environment override for the global pool's worker count, read once at
/// first construction. Changing it afterwards has no effect.
pub(crate) const ENV_NUM_THREADS: &str = "SPINDLE_NUM_THREADS";

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("spindle-{}", id)
    }))
}

/// Configures and builds a [`TaskPool`].
///
/// The global pool uses the defaults here (plus the `SPINDLE_NUM_THREADS`
/// override); explicit pools are mostly useful for tests and tools that need
/// a specific size.
#[derive(Debug)]
pub struct Builder {
    /// The number of worker threads. Defaults to 1 per CPU core.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the pool.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the pool.
    thread_stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
        }
    }

    /// Sets the number of worker threads.
    ///
    /// Defaults to [`thread::available_parallelism`].
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker_threads must be greater than 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets the name for every thread spawned by the pool.
    ///
    /// The default name is "spindle-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies a minimal stack size.
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Builds the pool: spawns every worker thread, or fails with no pool at
    /// all. There is no partially started state.
    pub fn try_build(self) -> Result<TaskPool> {
        TaskPool::try_new(self.try_into()?)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved configuration consumed by the pool.
#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
}

impl TryFrom<Builder> for PoolConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self> {
        let worker_threads = match builder.worker_threads {
            Some(n) => n,
            None => thread::available_parallelism()
                .context("failed to query available parallelism")?
                .get(),
        };

        Ok(PoolConfig {
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
        })
    }
}

/// Worker-count override from the environment. Unparseable or zero values are
/// ignored with a warning rather than failing pool construction.
pub(crate) fn env_worker_threads() -> Option<usize> {
    let raw = std::env::var(ENV_NUM_THREADS).ok()?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(value = %raw, "ignoring invalid {}", ENV_NUM_THREADS);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    // The config is cloned into every spawned worker thread.
    assert_impl_all!(PoolConfig: Send, Sync, Clone);

    #[test]
    fn default_worker_count_matches_hardware() {
        let cfg: PoolConfig = Builder::new().try_into().unwrap();
        assert_eq!(
            cfg.worker_threads,
            thread::available_parallelism().unwrap().get()
        );
    }

    #[test]
    fn explicit_worker_count_wins() {
        let cfg: PoolConfig = Builder::new().worker_threads(3).try_into().unwrap();
        assert_eq!(cfg.worker_threads, 3);
    }

    #[test]
    fn default_thread_names_are_sequential() {
        let name_fn = default_thread_name_fn();
        assert_eq!((name_fn.0)(), "spindle-0");
        assert_eq!((name_fn.0)(), "spindle-1");
    }

    #[test]
    #[should_panic(expected = "worker_threads must be greater than 0")]
    fn zero_workers_is_rejected() {
        let _ = Builder::new().worker_threads(0);
    }
}
