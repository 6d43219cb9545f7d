//! Tiered cache coordinator
//!
//! Composes the memory and disk tiers into one logical cache. Reads check
//! memory first and fall back to disk, promoting disk hits back into
//! memory. Writes and removals fan out to both tiers unconditionally, with
//! no rollback; one tier's failure never suppresses the other's outcome.
//!
//! Asynchronous fan-out operations join through a two-party counter so the
//! aggregate completion fires exactly once, on a dedicated notification
//! queue, only after both tiers have finished. The caller never observes a
//! partial fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::tier::{DiskStore, MemoryStore};
use crate::cache::worker::WorkQueue;

/// Two-tier cache over a memory store and a disk store.
///
/// Cheap to clone; clones share both tiers and the notification queue.
pub struct TieredCache<V> {
    memory: MemoryStore<V>,
    disk: DiskStore<V>,
    notify_queue: WorkQueue,
}

impl<V> Clone for TieredCache<V> {
    fn clone(&self) -> Self {
        Self {
            memory: self.memory.clone(),
            disk: self.disk.clone(),
            notify_queue: self.notify_queue.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> TieredCache<V> {
    /// Compose a cache from its two tiers.
    pub fn new(memory: MemoryStore<V>, disk: DiskStore<V>) -> Self {
        Self {
            memory,
            disk,
            notify_queue: WorkQueue::new("permacache-notify", 1),
        }
    }

    /// Memory tier handle.
    pub fn memory(&self) -> &MemoryStore<V> {
        &self.memory
    }

    /// Disk tier handle.
    pub fn disk(&self) -> &DiskStore<V> {
        &self.disk
    }

    /// Write to both tiers, regardless of either's success.
    pub fn set(&self, key: &str, value: V) {
        self.memory.set(key, value.clone());
        self.disk.set(key, &value);
    }

    /// Look up `key`: memory first, then disk. A disk hit is promoted back
    /// into the memory tier before it is returned.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }
        let value = self.disk.get(key)?;
        self.memory.set(key, value.clone());
        Some(value)
    }

    /// Remove `key` from both tiers.
    pub fn remove(&self, key: &str) {
        self.memory.remove(key);
        self.disk.remove(key);
    }

    /// Clear both tiers.
    pub fn remove_all(&self) {
        self.memory.remove_all();
        self.disk.remove_all();
    }

    /// Trim both tiers to `max_age`.
    pub fn trim_to_age(&self, max_age: Duration) {
        self.memory.trim_to_age(max_age);
        self.disk.trim_to_age(max_age);
    }

    /// Asynchronous [`set`](Self::set): both tier writes dispatch
    /// concurrently; `completion` fires exactly once, after both finish,
    /// with the stored value.
    pub fn set_async<F>(&self, key: impl Into<String>, value: V, completion: F)
    where
        F: FnOnce(&TieredCache<V>, &str, Option<V>) + Send + 'static,
    {
        let key = key.into();
        let cache = self.clone();
        let join = CompletionJoin::new(2, self.notify_queue.clone(), {
            let key = key.clone();
            move |payload| completion(&cache, &key, payload)
        });

        let memory_join = join.clone();
        self.memory
            .set_async(key.clone(), value.clone(), move |_, _, _| {
                memory_join.arrive();
            });
        self.disk.set_async(key, value, move |_, _, returned| {
            join.deposit(returned);
            join.arrive();
        });
    }

    /// Asynchronous [`get`](Self::get). The memory lookup completes before
    /// the disk tier is consulted; disk is only read on a proven memory
    /// miss.
    pub fn get_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&TieredCache<V>, &str, Option<V>) + Send + 'static,
    {
        let cache = self.clone();
        let key = key.into();
        self.notify_queue.execute(move || {
            let value = cache.get(&key);
            completion(&cache, &key, value);
        });
    }

    /// Asynchronous [`remove`](Self::remove) with two-tier join.
    pub fn remove_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&TieredCache<V>, &str) + Send + 'static,
    {
        let key = key.into();
        let cache = self.clone();
        let join = CompletionJoin::<V>::new(2, self.notify_queue.clone(), {
            let key = key.clone();
            move |_| completion(&cache, &key)
        });

        let memory_join = join.clone();
        self.memory.remove_async(key.clone(), move |_, _| {
            memory_join.arrive();
        });
        self.disk.remove_async(key, move |_, _| {
            join.arrive();
        });
    }

    /// Asynchronous [`remove_all`](Self::remove_all) with two-tier join.
    pub fn remove_all_async<F>(&self, completion: F)
    where
        F: FnOnce(&TieredCache<V>) + Send + 'static,
    {
        let cache = self.clone();
        let join = CompletionJoin::<V>::new(2, self.notify_queue.clone(), move |_| {
            completion(&cache)
        });

        let memory_join = join.clone();
        self.memory.remove_all_async(move |_| {
            memory_join.arrive();
        });
        self.disk.remove_all_async(move |_| {
            join.arrive();
        });
    }

    /// Asynchronous [`trim_to_age`](Self::trim_to_age) with two-tier join.
    pub fn trim_to_age_async<F>(&self, max_age: Duration, completion: F)
    where
        F: FnOnce(&TieredCache<V>) + Send + 'static,
    {
        let cache = self.clone();
        let join = CompletionJoin::<V>::new(2, self.notify_queue.clone(), move |_| {
            completion(&cache)
        });

        let memory_join = join.clone();
        self.memory.trim_to_age_async(max_age, move |_| {
            memory_join.arrive();
        });
        self.disk.trim_to_age_async(max_age, move |_| {
            join.arrive();
        });
    }
}

/// Join point for a fanned-out operation.
///
/// Initialized with the number of parties; each tier's completion calls
/// `arrive`, and the last arrival enqueues the aggregate completion on the
/// notification queue. The completion is taken out of its slot on firing,
/// so it can never run twice.
struct CompletionJoin<V> {
    inner: Arc<JoinInner<V>>,
}

impl<V> Clone for CompletionJoin<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

type JoinCompletion<V> = Box<dyn FnOnce(Option<V>) + Send + 'static>;

struct JoinInner<V> {
    remaining: AtomicUsize,
    payload: Mutex<Option<V>>,
    completion: Mutex<Option<JoinCompletion<V>>>,
    queue: WorkQueue,
}

impl<V: Send + 'static> CompletionJoin<V> {
    fn new(
        parties: usize,
        queue: WorkQueue,
        completion: impl FnOnce(Option<V>) + Send + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(JoinInner {
                remaining: AtomicUsize::new(parties),
                payload: Mutex::new(None),
                completion: Mutex::new(Some(Box::new(completion))),
                queue,
            }),
        }
    }

    /// Stash the value the aggregate completion should receive.
    fn deposit(&self, value: Option<V>) {
        if let Some(value) = value {
            let mut slot = match self.inner.payload.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(value);
        }
    }

    fn arrive(&self) {
        if self.inner.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let completion = {
            let mut slot = match self.inner.completion.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take()
        };
        let payload = {
            let mut slot = match self.inner.payload.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take()
        };
        if let Some(completion) = completion {
            self.inner.queue.execute(move || completion(payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::TierLimits;
    use crate::cache::serde::BincodeCodec;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> TieredCache<String> {
        let memory = MemoryStore::new(TierLimits::default(), 1);
        let disk = DiskStore::new(
            "tiered",
            dir.path(),
            TierLimits::default(),
            2,
            Arc::new(BincodeCodec),
        )
        .unwrap();
        TieredCache::new(memory, disk)
    }

    #[test]
    fn set_fans_out_to_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache.set("k", "v".to_string());
        assert!(cache.memory().contains("k"));
        assert!(cache.disk().contains("k"));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn disk_hit_promotes_into_memory() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        // Populate disk only.
        cache.disk().set("k", &"v".to_string());
        assert!(!cache.memory().contains("k"));

        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert!(cache.memory().contains("k"));

        // A subsequent get is served by memory even if disk loses the file.
        cache.disk().remove("k");
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn get_misses_when_both_tiers_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert_eq!(cache.get("absent"), None);
    }

    #[test]
    fn remove_clears_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache.set("k", "v".to_string());
        cache.remove("k");
        assert!(!cache.memory().contains("k"));
        assert!(!cache.disk().contains("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn remove_all_clears_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.remove_all();

        assert_eq!(cache.memory().count(), 0);
        assert_eq!(cache.disk().count(), 0);
    }

    #[test]
    fn trim_to_age_zero_empties_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache.set("a", "1".to_string());
        cache.trim_to_age(Duration::ZERO);

        assert_eq!(cache.memory().count(), 0);
        assert_eq!(cache.disk().count(), 0);
    }

    #[test]
    fn async_set_joins_both_tiers_exactly_once() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        let (tx, rx) = mpsc::channel();
        cache.set_async("k", "v".to_string(), move |cache, key, value| {
            // Both tiers have committed by the time the join fires.
            tx.send((
                cache.memory().contains(key),
                cache.disk().contains(key),
                value,
            ))
            .unwrap();
        });

        let (in_memory, on_disk, value) = rx.recv().unwrap();
        assert!(in_memory);
        assert!(on_disk);
        assert_eq!(value, Some("v".to_string()));

        // Exactly once.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn async_get_returns_value_and_promotes() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.disk().set("k", &"v".to_string());

        let (tx, rx) = mpsc::channel();
        cache.get_async("k", move |cache, key, value| {
            tx.send((value, cache.memory().contains(key))).unwrap();
        });

        let (value, promoted) = rx.recv().unwrap();
        assert_eq!(value, Some("v".to_string()));
        assert!(promoted);
    }

    #[test]
    fn async_remove_all_joins_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        let (tx, rx) = mpsc::channel();
        cache.remove_all_async(move |cache| {
            tx.send((cache.memory().count(), cache.disk().count())).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), (0, 0));
    }

    #[test]
    fn async_remove_joins_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.set("k", "v".to_string());

        let (tx, rx) = mpsc::channel();
        cache.remove_async("k", move |cache, key| {
            tx.send((cache.memory().contains(key), cache.disk().contains(key)))
                .unwrap();
        });
        assert_eq!(rx.recv().unwrap(), (false, false));
    }
}
