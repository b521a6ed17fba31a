use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// A unit of work: invoked exactly once by whichever worker pops it.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of a non-blocking pop. `Busy` (somebody else holds the queue lock)
/// is distinct from `Empty` so a stealing worker moves on to the next queue
/// instead of spinning on a contended one.
pub(crate) enum Popped {
    Task(Task),
    Empty,
    Busy,
}

struct State {
    tasks: VecDeque<Task>,
    /// Cleared by `quit()`; a push on a closed queue is a caller bug.
    open: bool,
}

/// One worker's pending-task queue. FIFO under a single lock, with a condvar
/// for the owning worker to block on when the whole pool has gone idle.
pub(crate) struct WorkerQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl WorkerQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                open: true,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends a task and wakes the owning worker if it was blocked on an
    /// empty queue.
    pub(crate) fn push(&self, task: Task) {
        let mut state = self.state.lock();
        debug_assert!(state.open, "push on a closed worker queue");
        let was_empty = state.tasks.is_empty();
        state.tasks.push_back(task);
        if was_empty {
            self.available.notify_one();
        }
    }

    /// Pops the head task without blocking. Returns `Busy` when the lock is
    /// contended rather than waiting for it.
    pub(crate) fn try_pop(&self) -> Popped {
        match self.state.try_lock() {
            Some(mut state) => match state.tasks.pop_front() {
                Some(task) => Popped::Task(task),
                None => Popped::Empty,
            },
            None => Popped::Busy,
        }
    }

    /// Blocks until a task is available or the queue is closed. `None` means
    /// closed and fully drained; remaining tasks are handed out first.
    pub(crate) fn pop_or_wait(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if !state.open {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Closes the queue and wakes every waiter.
    pub(crate) fn quit(&self) {
        let mut state = self.state.lock();
        state.open = false;
        self.available.notify_all();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    assert_impl_all!(WorkerQueue: Send, Sync);

    #[test]
    fn pops_in_submission_order() {
        let queue = WorkerQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..16 {
            let log = Arc::clone(&log);
            queue.push(Box::new(move || log.lock().push(i)));
        }

        while let Popped::Task(task) = queue.try_pop() {
            task();
        }
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn try_pop_reports_empty() {
        let queue = WorkerQueue::new();
        assert!(matches!(queue.try_pop(), Popped::Empty));
    }

    #[test]
    fn try_pop_reports_busy_under_contention() {
        let queue = WorkerQueue::new();
        let _guard = queue.state.lock();
        assert!(matches!(queue.try_pop(), Popped::Busy));
    }

    #[test]
    fn quit_wakes_blocked_waiter() {
        let queue = Arc::new(WorkerQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_or_wait().is_none())
        };

        // Give the waiter time to actually block before closing.
        thread::sleep(Duration::from_millis(10));
        queue.quit();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn push_wakes_blocked_waiter() {
        let queue = Arc::new(WorkerQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let task = queue.pop_or_wait().expect("queue still open");
                task();
            })
        };

        thread::sleep(Duration::from_millis(10));
        let ran_in_task = Arc::clone(&ran);
        queue.push(Box::new(move || {
            ran_in_task.fetch_add(1, Ordering::Relaxed);
        }));

        waiter.join().unwrap();
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn pop_or_wait_drains_before_reporting_closed() {
        let queue = WorkerQueue::new();
        queue.push(Box::new(|| {}));
        queue.quit();

        assert!(queue.pop_or_wait().is_some());
        assert!(queue.pop_or_wait().is_none());
    }
}
