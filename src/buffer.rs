use crate::store::ThreadLocalStore;

/// Per-thread append-only buffers with a combining gather.
///
/// The scatter/gather workhorse: tasks [`push`](ThreadLocalBuffer::push) into
/// their own thread's vector with no synchronization, and the driving thread
/// [`gather`](ThreadLocalBuffer::gather)s everything into one sequence once
/// the batch has been joined. Gathering concurrently with pushes observes an
/// unspecified subset; join first.
pub struct ThreadLocalBuffer<T> {
    store: ThreadLocalStore<Vec<T>>,
}

impl<T: Clone> ThreadLocalBuffer<T> {
    pub fn new() -> Self {
        Self {
            store: ThreadLocalStore::new(Vec::new()),
        }
    }

    /// Appends to the calling thread's private buffer.
    pub fn push(&self, item: T) {
        self.store.local().push(item);
    }

    /// Concatenates every thread's buffer into one vector. The buffers are
    /// left untouched; order across threads is unspecified.
    pub fn gather(&self) -> Vec<T> {
        let total = self.store.iter().map(|slot| slot.len()).sum();

        let mut gathered = Vec::with_capacity(total);
        for slot in self.store.iter() {
            gathered.extend_from_slice(&slot);
        }
        gathered
    }

    /// Empties every thread's buffer.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.store.iter().all(|slot| slot.is_empty())
    }
}

impl<T: Clone> Default for ThreadLocalBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
