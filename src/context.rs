use std::cell::Cell;

/// Identity of a pool worker thread. The pool id keeps identities from
/// distinct pools (common in tests) from aliasing each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerId {
    pub(crate) pool: u64,
    pub(crate) index: usize,
}

thread_local! {
    static CURRENT_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Binds the calling thread to a pool worker slot. Called exactly once, first
/// thing in the worker loop; the binding lives until the thread exits.
pub(crate) fn register_worker(pool: u64, index: usize) {
    CURRENT_WORKER.with(|current| {
        debug_assert!(
            current.get().is_none(),
            "worker thread registered with a pool twice"
        );
        current.set(Some(WorkerId { pool, index }));
    });
}

/// Worker identity of the calling thread, `None` for threads no pool owns.
pub(crate) fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn unregistered_thread_has_no_identity() {
        let handle = thread::spawn(|| current_worker());
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn registration_is_per_thread() {
        let handle = thread::spawn(|| {
            register_worker(7, 3);
            current_worker()
        });
        assert_eq!(handle.join().unwrap(), Some(WorkerId { pool: 7, index: 3 }));
    }
}
