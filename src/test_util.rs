use crate::pool::{Builder, TaskPool};

/// A pool with `n` workers and per-test thread names, panicking loudly if the
/// OS refuses to spawn threads.
pub(crate) fn pool(n: usize) -> TaskPool {
    init_tracing();
    Builder::new()
        .worker_threads(n)
        .thread_name_fn(move || format!("spindle-test-{}", n))
        .try_build()
        .expect("failed to build test pool")
}

/// Routes `tracing` output through the test harness capture. Safe to call
/// from every test; only the first call installs the subscriber.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
