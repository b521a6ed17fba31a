use crate::group::TaskGroup;
use crate::pool::TaskPool;
use std::cmp;

/// Pointer to the caller's loop body, type-erased so the chunk tasks can be
/// `'static`. Sound because `apply` joins every chunk before returning, so
/// the pointee outlives every dereference.
struct BodyPtr(*const ());

// Safety: the pointee is only shared, never moved or mutated, and `F: Sync`
// makes `&F` safe to use from the worker threads.
unsafe impl Send for BodyPtr {}

/// Partitions `[begin, end)` into at most `worker_count` contiguous chunks
/// and drives them through one task group, one task per chunk, each chunk
/// walked sequentially. An empty range forks nothing and returns immediately.
///
/// Nested calls are safe at any depth: the group's wait makes an enclosing
/// worker steal work instead of blocking, so inner ranges always make
/// progress even with every worker already inside an outer `apply`.
pub(crate) fn apply<F>(pool: &TaskPool, begin: usize, end: usize, body: F)
where
    F: Fn(usize) + Sync,
{
    if begin >= end {
        return;
    }

    let len = end - begin;
    let chunks = cmp::min(pool.worker_count(), len);
    let chunk_len = len.div_ceil(chunks);

    let mut group = TaskGroup::on(pool);
    for chunk_begin in (begin..end).step_by(chunk_len) {
        let chunk_end = cmp::min(chunk_begin + chunk_len, end);
        let ptr = BodyPtr(&body as *const F as *const ());

        group.run(move || {
            // Capture the whole `BodyPtr` (which is `Send`) rather than its
            // inner `*const ()` field under 2021 disjoint closure captures.
            let ptr = ptr;
            // Safety: `wait` below joins this task before `body` leaves
            // scope; see `BodyPtr`.
            let body = unsafe { &*(ptr.0 as *const F) };
            for i in chunk_begin..chunk_end {
                body(i);
            }
        });
    }
    group.wait();
}
