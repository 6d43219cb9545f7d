//! Memory tier cache store
//!
//! In-process store honoring the same get/set/remove/trim contract as the
//! disk tier, without persistence. Values live in a map beside a private
//! recency index; one lock guards both so the index ordering and the
//! aggregate totals can never drift from the stored values.
//!
//! Cost is caller-declared here (there is no file to measure): plain `set`
//! records a cost of zero, `set_with_cost` is the cost-aware entry point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crossbeam_utils::CachePadded;

use crate::cache::config::TierLimits;
use crate::cache::recency::RecencyIndex;
use crate::cache::worker::WorkQueue;
use crate::telemetry::{TierStatistics, TierStatsSnapshot};

/// In-memory cache store. Cheap to clone; clones share the store.
pub struct MemoryStore<V> {
    shared: Arc<MemoryStoreShared<V>>,
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct MemoryState<V> {
    values: HashMap<String, V>,
    index: RecencyIndex,
}

struct MemoryStoreShared<V> {
    state: Mutex<MemoryState<V>>,
    count_limit: CachePadded<AtomicUsize>,
    cost_limit: CachePadded<AtomicU64>,
    age_limit_ns: CachePadded<AtomicU64>,
    stats: TierStatistics,
    queue: WorkQueue,
}

impl<V: Clone + Send + Sync + 'static> MemoryStore<V> {
    /// Create a memory store with the given limits.
    pub fn new(limits: TierLimits, worker_threads: usize) -> Self {
        Self {
            shared: Arc::new(MemoryStoreShared {
                state: Mutex::new(MemoryState {
                    values: HashMap::new(),
                    index: RecencyIndex::new(),
                }),
                count_limit: CachePadded::new(AtomicUsize::new(limits.count_limit)),
                cost_limit: CachePadded::new(AtomicU64::new(limits.cost_limit)),
                age_limit_ns: CachePadded::new(AtomicU64::new(duration_to_nanos(
                    limits.age_limit,
                ))),
                stats: TierStatistics::new(),
                queue: WorkQueue::new("permacache-memory", worker_threads),
            }),
        }
    }

    /// Store `value` under `key` with a cost of zero.
    pub fn set(&self, key: &str, value: V) {
        self.set_with_cost(key, value, 0);
    }

    /// Store `value` under `key` with an explicit byte-cost weight.
    pub fn set_with_cost(&self, key: &str, value: V, cost: u64) {
        if key.is_empty() {
            return;
        }
        let mut state = self.lock_state();
        state.values.insert(key.to_string(), value);
        state.index.upsert(key, cost, SystemTime::now());
        self.shared.stats.record_write();
        self.enforce_limits_locked(&mut state);
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.lock_state();
        match state.values.get(key).cloned() {
            Some(value) => {
                state.index.touch(key, SystemTime::now());
                self.shared.stats.record_hit();
                Some(value)
            }
            None => {
                self.shared.stats.record_miss();
                None
            }
        }
    }

    /// Remove `key`. No-op if absent.
    pub fn remove(&self, key: &str) {
        let mut state = self.lock_state();
        state.values.remove(key);
        state.index.remove(key);
    }

    /// Drop every entry.
    pub fn remove_all(&self) {
        let mut state = self.lock_state();
        state.values.clear();
        state.index.clear();
    }

    /// Evict from the tail until at most `limit` entries remain.
    pub fn trim_to_count(&self, limit: usize) {
        let mut state = self.lock_state();
        trim_to_count_locked(&mut state, &self.shared.stats, limit);
    }

    /// Evict from the tail until aggregate cost is at most `limit`.
    pub fn trim_to_cost(&self, limit: u64) {
        let mut state = self.lock_state();
        trim_to_cost_locked(&mut state, &self.shared.stats, limit);
    }

    /// Evict tail entries older than `max_age`.
    pub fn trim_to_age(&self, max_age: Duration) {
        let mut state = self.lock_state();
        trim_to_age_locked(&mut state, &self.shared.stats, max_age);
    }

    /// Current entry count.
    pub fn count(&self) -> usize {
        self.lock_state().index.count()
    }

    /// Current aggregate cost.
    pub fn total_cost(&self) -> u64 {
        self.lock_state().index.total_cost()
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.lock_state().values.contains_key(key)
    }

    pub fn count_limit(&self) -> usize {
        self.shared.count_limit.load(Ordering::Relaxed)
    }

    /// Set the count limit and immediately trim to it.
    pub fn set_count_limit(&self, limit: usize) {
        self.shared.count_limit.store(limit, Ordering::Relaxed);
        self.trim_to_count(limit);
    }

    pub fn cost_limit(&self) -> u64 {
        self.shared.cost_limit.load(Ordering::Relaxed)
    }

    /// Set the cost limit and immediately trim to it.
    pub fn set_cost_limit(&self, limit: u64) {
        self.shared.cost_limit.store(limit, Ordering::Relaxed);
        self.trim_to_cost(limit);
    }

    pub fn age_limit(&self) -> Duration {
        Duration::from_nanos(self.shared.age_limit_ns.load(Ordering::Relaxed))
    }

    /// Set the age limit and immediately trim to it.
    pub fn set_age_limit(&self, limit: Duration) {
        self.shared
            .age_limit_ns
            .store(duration_to_nanos(limit), Ordering::Relaxed);
        self.trim_to_age(limit);
    }

    /// Tier statistics snapshot.
    pub fn stats(&self) -> TierStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Asynchronous [`set`](Self::set).
    pub fn set_async<F>(&self, key: impl Into<String>, value: V, completion: F)
    where
        F: FnOnce(&MemoryStore<V>, &str, Option<V>) + Send + 'static,
    {
        let store = self.clone();
        let key = key.into();
        self.shared.queue.execute(move || {
            store.set(&key, value.clone());
            completion(&store, &key, Some(value));
        });
    }

    /// Asynchronous [`get`](Self::get).
    pub fn get_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&MemoryStore<V>, &str, Option<V>) + Send + 'static,
    {
        let store = self.clone();
        let key = key.into();
        self.shared.queue.execute(move || {
            let value = store.get(&key);
            completion(&store, &key, value);
        });
    }

    /// Asynchronous [`remove`](Self::remove).
    pub fn remove_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&MemoryStore<V>, &str) + Send + 'static,
    {
        let store = self.clone();
        let key = key.into();
        self.shared.queue.execute(move || {
            store.remove(&key);
            completion(&store, &key);
        });
    }

    /// Asynchronous [`remove_all`](Self::remove_all).
    pub fn remove_all_async<F>(&self, completion: F)
    where
        F: FnOnce(&MemoryStore<V>) + Send + 'static,
    {
        let store = self.clone();
        self.shared.queue.execute(move || {
            store.remove_all();
            completion(&store);
        });
    }

    /// Asynchronous [`trim_to_count`](Self::trim_to_count).
    pub fn trim_to_count_async<F>(&self, limit: usize, completion: F)
    where
        F: FnOnce(&MemoryStore<V>) + Send + 'static,
    {
        let store = self.clone();
        self.shared.queue.execute(move || {
            store.trim_to_count(limit);
            completion(&store);
        });
    }

    /// Asynchronous [`trim_to_cost`](Self::trim_to_cost).
    pub fn trim_to_cost_async<F>(&self, limit: u64, completion: F)
    where
        F: FnOnce(&MemoryStore<V>) + Send + 'static,
    {
        let store = self.clone();
        self.shared.queue.execute(move || {
            store.trim_to_cost(limit);
            completion(&store);
        });
    }

    /// Asynchronous [`trim_to_age`](Self::trim_to_age).
    pub fn trim_to_age_async<F>(&self, max_age: Duration, completion: F)
    where
        F: FnOnce(&MemoryStore<V>) + Send + 'static,
    {
        let store = self.clone();
        self.shared.queue.execute(move || {
            store.trim_to_age(max_age);
            completion(&store);
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState<V>> {
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn enforce_limits_locked(&self, state: &mut MemoryState<V>) {
        let stats = &self.shared.stats;
        let cost_limit = self.cost_limit();
        if state.index.total_cost() > cost_limit {
            trim_to_cost_locked(state, stats, cost_limit);
        }
        let count_limit = self.count_limit();
        if state.index.count() > count_limit {
            trim_to_count_locked(state, stats, count_limit);
        }
        trim_to_age_locked(state, stats, self.age_limit());
    }
}

fn evict_tail_locked<V>(state: &mut MemoryState<V>, stats: &TierStatistics) -> bool {
    match state.index.remove_tail() {
        Some(entry) => {
            state.values.remove(&entry.key);
            stats.record_eviction();
            true
        }
        None => false,
    }
}

fn trim_to_count_locked<V>(state: &mut MemoryState<V>, stats: &TierStatistics, limit: usize) {
    while state.index.count() > limit {
        if !evict_tail_locked(state, stats) {
            break;
        }
    }
}

fn trim_to_cost_locked<V>(state: &mut MemoryState<V>, stats: &TierStatistics, limit: u64) {
    if limit == 0 {
        // Zero-cost entries never exceed a zero budget; clear outright.
        state.values.clear();
        state.index.clear();
        return;
    }
    while state.index.total_cost() > limit {
        if !evict_tail_locked(state, stats) {
            break;
        }
    }
}

fn trim_to_age_locked<V>(state: &mut MemoryState<V>, stats: &TierStatistics, max_age: Duration) {
    if max_age.is_zero() {
        state.values.clear();
        state.index.clear();
        return;
    }
    let cutoff = match SystemTime::now().checked_sub(max_age) {
        Some(cutoff) => cutoff,
        None => return,
    };
    while let Some(tail) = state.index.tail_entry() {
        if tail.last_access >= cutoff {
            break;
        }
        if !evict_tail_locked(state, stats) {
            break;
        }
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
