use crate::context;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

/// Identity a slot is keyed by: the pool worker index when the caller is a
/// pool worker, the OS thread id otherwise. Off-pool threads (typically the
/// one driving a simulation step) get ordinary slots of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SlotKey {
    Worker { pool: u64, index: usize },
    Thread(ThreadId),
}

fn slot_key() -> SlotKey {
    match context::current_worker() {
        Some(worker) => SlotKey::Worker {
            pool: worker.pool,
            index: worker.index,
        },
        None => SlotKey::Thread(thread::current().id()),
    }
}

/// One private value per thread, created lazily from an initial value.
///
/// [`local`](ThreadLocalStore::local) never contends with other threads'
/// steady-state accesses; only the first touch from a given thread takes the
/// guarded slot-creation path. Iteration visits every slot touched so far, in
/// unspecified order.
///
/// Holding the guard returned by `local` while iterating the same store (or
/// the other way around) is a usage error and deadlocks.
pub struct ThreadLocalStore<T> {
    init: T,
    slots: DashMap<SlotKey, T>,
}

/// Exclusive guard over the calling thread's slot.
pub struct LocalRef<'a, T>(RefMut<'a, SlotKey, T>);

impl<T> Deref for LocalRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0.value()
    }
}

impl<T> DerefMut for LocalRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.0.value_mut()
    }
}

impl<T: Clone> ThreadLocalStore<T> {
    /// A store whose slots start out as clones of `init`.
    pub fn new(init: T) -> Self {
        Self {
            init,
            slots: DashMap::new(),
        }
    }

    /// The calling thread's private slot, created on first access.
    pub fn local(&self) -> LocalRef<'_, T> {
        LocalRef(
            self.slots
                .entry(slot_key())
                .or_insert_with(|| self.init.clone()),
        )
    }

    /// Visits every slot touched so far. Order is unspecified.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = impl Deref<Target = T> + 'a> + 'a {
        self.slots.iter()
    }

    /// Resets every existing slot to the initial value. Slots stay allocated.
    pub fn clear(&self) {
        for mut slot in self.slots.iter_mut() {
            *slot = self.init.clone();
        }
    }

    /// Number of slots touched so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
