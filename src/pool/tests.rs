use super::*;
use crate::group::TaskGroup;
use crate::test_util::{init_tracing, pool};
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::atomic::Ordering;
use std::time::Duration;

assert_impl_all!(TaskPool: Send, Sync);
assert_impl_all!(Builder: Send);

#[test]
fn pool_starts_the_configured_worker_count() {
    let pool = pool(4);
    assert_eq!(pool.worker_count(), 4);
    assert_eq!(pool.current_worker(), None, "the test thread is not a worker");
}

#[test]
fn workers_report_identities_in_range() {
    let pool = Arc::new(pool(3));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut group = TaskGroup::on(&pool);
    for _ in 0..64 {
        let pool = Arc::clone(&pool);
        let seen = Arc::clone(&seen);
        group.run(move || {
            seen.lock().push(pool.current_worker());
        });
    }
    group.wait();

    let seen = seen.lock();
    assert_eq!(seen.len(), 64);
    for index in seen.iter() {
        assert!(matches!(index, Some(i) if *i < 3));
    }
}

#[test]
fn identities_do_not_leak_across_pools() {
    let pool_a = Arc::new(pool(2));
    let pool_b = Arc::new(pool(2));

    let mut group = TaskGroup::on(&pool_a);
    {
        let pool_a = Arc::clone(&pool_a);
        let pool_b = Arc::clone(&pool_b);
        group.run(move || {
            assert!(pool_a.current_worker().is_some());
            assert!(
                pool_b.current_worker().is_none(),
                "a worker of pool A must have no identity in pool B"
            );
        });
    }
    group.wait();
}

#[test]
fn dropping_the_pool_runs_every_queued_task() {
    init_tracing();
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let pool = pool(2);
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        // Drop closes the queues; workers drain them before exiting.
    }

    assert_eq!(counter.load(Ordering::Relaxed), 100);
}

#[test]
fn a_panicking_submit_does_not_kill_the_worker() {
    let pool = pool(1);
    pool.submit(|| panic!("fire-and-forget failure"));

    // The single worker must survive to run the follow-up batch.
    let ran = Arc::new(AtomicUsize::new(0));
    let mut group = TaskGroup::on(&pool);
    for _ in 0..10 {
        let ran = Arc::clone(&ran);
        group.run(move || {
            ran.fetch_add(1, Ordering::Relaxed);
        });
    }
    group.wait();
    assert_eq!(ran.load(Ordering::Relaxed), 10);
}

#[test]
fn submissions_from_many_threads_all_run() {
    let pool = Arc::new(pool(4));
    let counter = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                let mut group = TaskGroup::on(&pool);
                for _ in 0..500 {
                    let counter = Arc::clone(&counter);
                    group.run(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                }
                group.wait();
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    assert_eq!(counter.load(Ordering::Relaxed), 8 * 500);
}

// Deadlock check: many more blocking tasks than workers.
#[rstest]
#[case::single_worker(1)]
#[case::many_workers(8)]
fn oversubscribed_sleeping_tasks_complete(#[case] workers: usize) {
    let pool = pool(workers);

    let mut group = TaskGroup::on(&pool);
    for _ in 0..32 * workers {
        group.run(|| thread::sleep(Duration::from_micros(500)));
    }
    group.wait();
}

// Deadlock check for nested parallelism: every worker is inside an outer
// task when the inner ranges start.
#[rstest]
#[case::single_worker(1)]
#[case::many_workers(4)]
fn nested_parallelism_with_saturated_pool_completes(#[case] workers: usize) {
    let pool = Arc::new(pool(workers));

    let mut group = TaskGroup::on(&pool);
    for _ in 0..workers {
        let pool = Arc::clone(&pool);
        group.run(move || {
            pool.parallel_for(0, pool.worker_count(), |_| {
                thread::sleep(Duration::from_micros(500));
            });
        });
    }
    group.wait();
}

#[test]
fn global_pool_entry_points_work() {
    // The global pool is shared by the whole test binary; keep this to
    // read-mostly checks plus one small parallel_for.
    assert!(crate::worker_count() >= 1);
    assert_eq!(crate::current_worker(), None);

    let v: Vec<AtomicUsize> = (0..100).map(|_| AtomicUsize::new(0)).collect();
    crate::parallel_for(0, v.len(), |i| {
        v[i].fetch_add(1, Ordering::Relaxed);
    });
    assert!(v.iter().all(|c| c.load(Ordering::Relaxed) == 1));
}
