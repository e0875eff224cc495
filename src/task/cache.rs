use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::task::{Task, TypeKey};

/// A task type paired with the canonical rendering of every parameter value.
pub(crate) type CacheKey = (TypeKey, Vec<String>);

type Entries = HashMap<CacheKey, Weak<Task>>;

/// Deduplicates task instances within a process.
///
/// Constructing a task with the same type and the same parameter values
/// twice returns the same `Arc<Task>`, as long as the first one is still
/// referenced somewhere. The cache only holds weak references, and an entry
/// is removed when the last strong reference to its task is dropped, so a
/// long-running scheduler does not accumulate dead entries.
///
/// The cache is a cheap handle; clones share the same entries.
#[derive(Clone, Default)]
pub struct InstanceCache {
    inner: Arc<Mutex<Entries>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Entries are only ever inserted or removed whole.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a live instance for `key`, building and registering a new
    /// one when there is none. Lookup and insertion happen under one lock.
    pub(crate) fn get_or_insert_with<F>(&self, key: CacheKey, build: F) -> Arc<Task>
    where
        F: FnOnce(CacheSlot) -> Task,
    {
        let mut entries = self.lock();

        if let Some(task) = entries.get(&key).and_then(Weak::upgrade) {
            tracing::trace!("instance cache hit for {}", task.task_id());
            return task;
        }

        let slot = CacheSlot {
            cache: Arc::downgrade(&self.inner),
            key: key.clone(),
        };

        let task = Arc::new(build(slot));
        tracing::trace!("instance cache miss for {}", task.task_id());
        entries.insert(key, Arc::downgrade(&task));

        task
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every entry. Existing instances stay valid, but the next
    /// construction builds a fresh one.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Whether `task` is the canonical instance for its type and values.
    pub fn contains(&self, task: &Arc<Task>) -> bool {
        let key = (task.task_type().key(), task.rendered.clone());

        // The upgraded handle must outlive the guard, its drop may evict.
        let cached = self.lock().get(&key).and_then(Weak::upgrade);
        cached.is_some_and(|cached| Arc::ptr_eq(&cached, task))
    }
}

impl std::fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCache")
            .field("len", &self.len())
            .finish()
    }
}

/// Back-reference from a cached task to its entry, evicting the entry when
/// the task is dropped.
pub(crate) struct CacheSlot {
    cache: Weak<Mutex<Entries>>,
    key: CacheKey,
}

impl Drop for CacheSlot {
    fn drop(&mut self) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };

        let mut entries = cache.lock().unwrap_or_else(PoisonError::into_inner);

        // The entry may already point at a newer instance built after this
        // one lost its last reference.
        if entries
            .get(&self.key)
            .is_some_and(|entry| entry.strong_count() == 0)
        {
            entries.remove(&self.key);
            tracing::trace!("evicted instance cache entry for {:?}", self.key.0);
        }
    }
}
