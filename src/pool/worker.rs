use crate::context;
use crate::pool::{Shared, Task};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

/// The worker loop. Favors locality (drain the own queue) over stealing, and
/// blocks only after one full sweep of every queue came up empty.
pub(super) fn run(shared: Arc<Shared>, index: usize) {
    context::register_worker(shared.id, index);
    trace!(worker = index, "worker started");

    loop {
        // Own queue first, then steal. Repeat while anything is runnable.
        if shared.run_one(index) {
            continue;
        }

        // Globally idle as far as this worker can tell: block on the own
        // queue until a push lands there or the pool shuts down. A closed,
        // drained queue ends the loop.
        match shared.own_queue(index).pop_or_wait() {
            Some(task) => execute(task),
            None => break,
        }
    }

    trace!(worker = index, "worker stopped");
}

/// Runs one task, containing any panic to that task. Group tasks record the
/// panic in their group before it gets here; a panic that does reach this
/// point comes from a fire-and-forget `submit` and is logged and dropped so
/// the worker survives to keep scheduling.
pub(crate) fn execute(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(
            cause = panic_message(payload.as_ref()),
            "task panicked outside of a task group"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
