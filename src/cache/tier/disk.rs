//! Disk tier persistent cache store
//!
//! Persists serialized objects as one flat file per key inside a per-cache
//! instance directory. File metadata is the durable cache-engine state:
//! modification time is the last access time (stamped on every successful
//! read and write) and file length is the entry cost. No manifest or index
//! file exists on disk; the recency index is rebuilt from file metadata on
//! every cold start.
//!
//! Every operation acquires the store's single lock for its entire
//! duration, including the disk I/O itself. Concurrent dispatch therefore
//! buys concurrency between the caller and the store's work, never inside a
//! store's critical sections.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crossbeam_utils::CachePadded;

use crate::cache::config::{storage_directory, TierLimits};
use crate::cache::recency::RecencyIndex;
use crate::cache::traits::{CacheOperationError, ObjectCodec};
use crate::cache::worker::WorkQueue;
use crate::telemetry::{TierStatistics, TierStatsSnapshot};

/// Persistent disk-backed cache store.
///
/// Cheap to clone; clones share the store. Two stores constructed with the
/// same name and base path deliberately share one backing directory while
/// keeping independent in-memory indices, so callers doing that must
/// tolerate index staleness between the instances.
pub struct DiskStore<V> {
    shared: Arc<DiskStoreShared<V>>,
}

impl<V> Clone for DiskStore<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct DiskStoreShared<V> {
    name: String,
    directory: PathBuf,
    codec: Arc<dyn ObjectCodec<V>>,
    /// Guards the index and the filesystem together; held across I/O.
    state: Mutex<RecencyIndex>,
    count_limit: CachePadded<AtomicUsize>,
    cost_limit: CachePadded<AtomicU64>,
    age_limit_ns: CachePadded<AtomicU64>,
    stats: TierStatistics,
    queue: WorkQueue,
}

impl<V: Send + Sync + 'static> DiskStore<V> {
    /// Create a disk store rooted at `<base_dir>/permacache.<name>`.
    ///
    /// Fails only on an empty name or base path. Directory creation is
    /// best-effort; if it fails the store degrades to non-persistent no-op
    /// behavior rather than erroring. Existing files are bootstrap-scanned
    /// into the recency index (ascending by modification time, so the
    /// newest file ends up at the head) and the configured limits are
    /// enforced against the scanned contents.
    pub fn new(
        name: &str,
        base_dir: &Path,
        limits: TierLimits,
        worker_threads: usize,
        codec: Arc<dyn ObjectCodec<V>>,
    ) -> Result<Self, CacheOperationError> {
        if name.is_empty() {
            return Err(CacheOperationError::configuration_error(
                "disk store name must not be empty",
            ));
        }
        if base_dir.as_os_str().is_empty() {
            return Err(CacheOperationError::configuration_error(
                "disk store base path must not be empty",
            ));
        }

        let directory = storage_directory(base_dir, name);
        if let Err(e) = fs::create_dir_all(&directory) {
            log::warn!(
                "disk store {} could not create {:?}, persistence disabled: {}",
                name,
                directory,
                e
            );
        }

        let mut index = RecencyIndex::new();
        bootstrap_scan(&directory, &mut index);

        let store = Self {
            shared: Arc::new(DiskStoreShared {
                name: name.to_string(),
                directory,
                codec,
                state: Mutex::new(index),
                count_limit: CachePadded::new(AtomicUsize::new(limits.count_limit)),
                cost_limit: CachePadded::new(AtomicU64::new(limits.cost_limit)),
                age_limit_ns: CachePadded::new(AtomicU64::new(duration_to_nanos(
                    limits.age_limit,
                ))),
                stats: TierStatistics::new(),
                queue: WorkQueue::new(&format!("permacache-disk-{}", name), worker_threads),
            }),
        };

        // Limits apply to bootstrapped content as well.
        store.trim_to_cost(limits.cost_limit);
        store.trim_to_count(limits.count_limit);
        store.trim_to_age(limits.age_limit);

        Ok(store)
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Instance directory.
    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    /// Serialize `value` and persist it under `key`, replacing any
    /// existing content. The store lock is held for the whole operation,
    /// serialization included.
    ///
    /// A serialization or filesystem failure leaves the index untouched and
    /// is absorbed. Limit enforcement (cost before count, then age) runs
    /// whether or not the write applied.
    pub fn set(&self, key: &str, value: &V) {
        if !key_is_storable(key) {
            return;
        }
        let mut index = self.lock_index();
        let bytes = match self.shared.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("disk store {}: encode failed for {}: {}", self.name(), key, e);
                return;
            }
        };
        let path = self.path_for(key);
        match fs::write(&path, &bytes) {
            Ok(()) => {
                let now = SystemTime::now();
                if let Err(e) = stamp_modified(&path, now) {
                    log::debug!("disk store {}: could not stamp {:?}: {}", self.name(), path, e);
                }
                let cost = fs::metadata(&path)
                    .map(|m| m.len())
                    .unwrap_or(bytes.len() as u64);
                index.upsert(key, cost, now);
                self.shared.stats.record_write();
            }
            Err(e) => {
                log::warn!("disk store {}: write failed for {:?}: {}", self.name(), path, e);
            }
        }
        self.enforce_limits_locked(&mut index);
    }

    /// Read and deserialize the value stored under `key`.
    ///
    /// A hit refreshes the file's modification time and touches the index.
    /// Returns `None` for an absent file or a failed decode; a failed
    /// decode does not remove the entry (corrupt files already on disk are
    /// not self-healing).
    pub fn get(&self, key: &str) -> Option<V> {
        if !key_is_storable(key) {
            return None;
        }
        let mut index = self.lock_index();
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    log::debug!("disk store {}: read failed for {:?}: {}", self.name(), path, e);
                }
                self.shared.stats.record_miss();
                return None;
            }
        };

        let now = SystemTime::now();
        if let Err(e) = stamp_modified(&path, now) {
            log::debug!("disk store {}: could not stamp {:?}: {}", self.name(), path, e);
        }
        index.touch(key, now);

        match self.shared.codec.decode(&bytes) {
            Ok(value) => {
                self.shared.stats.record_hit();
                Some(value)
            }
            Err(e) => {
                log::warn!("disk store {}: decode failed for {}: {}", self.name(), key, e);
                self.shared.stats.record_miss();
                None
            }
        }
    }

    /// Delete `key`'s file and index entry. No-op if absent.
    pub fn remove(&self, key: &str) {
        if !key_is_storable(key) {
            return;
        }
        let mut index = self.lock_index();
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                // Keep the entry; the file is still there.
                log::warn!("disk store {}: remove failed for {:?}: {}", self.name(), path, e);
                return;
            }
        }
        index.remove(key);
    }

    /// Delete the entire instance directory and clear the index.
    pub fn remove_all(&self) {
        let mut index = self.lock_index();
        self.remove_all_locked(&mut index);
    }

    /// Evict from the tail until at most `limit` entries remain.
    /// A limit of zero is equivalent to [`remove_all`](Self::remove_all).
    pub fn trim_to_count(&self, limit: usize) {
        let mut index = self.lock_index();
        self.trim_to_count_locked(&mut index, limit);
    }

    /// Evict from the tail until aggregate cost is at most `limit` bytes.
    /// A limit of zero is equivalent to [`remove_all`](Self::remove_all).
    pub fn trim_to_cost(&self, limit: u64) {
        let mut index = self.lock_index();
        self.trim_to_cost_locked(&mut index, limit);
    }

    /// Evict tail entries whose last access is older than `max_age`.
    ///
    /// Entries closer to the head are at least as recent, so the loop stops
    /// at the first in-window tail. A zero age is equivalent to
    /// [`remove_all`](Self::remove_all).
    pub fn trim_to_age(&self, max_age: Duration) {
        let mut index = self.lock_index();
        self.trim_to_age_locked(&mut index, max_age);
    }

    /// Current entry count.
    pub fn count(&self) -> usize {
        self.lock_index().count()
    }

    /// Current aggregate cost in bytes.
    pub fn total_cost(&self) -> u64 {
        self.lock_index().total_cost()
    }

    /// Whether the index holds `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.lock_index().contains(key)
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

    /// Asynchronous [`set`](Self::set); the completion runs on the store's
    /// work queue after the write has committed, with the stored value.
    pub fn set_async<F>(&self, key: impl Into<String>, value: V, completion: F)
    where
        F: FnOnce(&DiskStore<V>, &str, Option<V>) + Send + 'static,
    {
        let store = self.clone();
        let key = key.into();
        self.shared.queue.execute(move || {
            store.set(&key, &value);
            completion(&store, &key, Some(value));
        });
    }

    /// Asynchronous [`get`](Self::get).
    pub fn get_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&DiskStore<V>, &str, Option<V>) + Send + 'static,
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
        F: FnOnce(&DiskStore<V>, &str) + Send + 'static,
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
        F: FnOnce(&DiskStore<V>) + Send + 'static,
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
        F: FnOnce(&DiskStore<V>) + Send + 'static,
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
        F: FnOnce(&DiskStore<V>) + Send + 'static,
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
        F: FnOnce(&DiskStore<V>) + Send + 'static,
    {
        let store = self.clone();
        self.shared.queue.execute(move || {
            store.trim_to_age(max_age);
            completion(&store);
        });
    }

    fn lock_index(&self) -> MutexGuard<'_, RecencyIndex> {
        // A panic under the lock must not disable the cache for everyone
        // else; the state is always safe to keep using.
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.shared.directory.join(key)
    }

    fn enforce_limits_locked(&self, index: &mut RecencyIndex) {
        let cost_limit = self.cost_limit();
        if index.total_cost() > cost_limit {
            self.trim_to_cost_locked(index, cost_limit);
        }
        let count_limit = self.count_limit();
        if index.count() > count_limit {
            self.trim_to_count_locked(index, count_limit);
        }
        self.trim_to_age_locked(index, self.age_limit());
    }

    fn trim_to_count_locked(&self, index: &mut RecencyIndex, limit: usize) {
        if limit == 0 {
            self.remove_all_locked(index);
            return;
        }
        while index.count() > limit {
            if !self.evict_tail_locked(index) {
                break;
            }
        }
    }

    fn trim_to_cost_locked(&self, index: &mut RecencyIndex, limit: u64) {
        if limit == 0 {
            self.remove_all_locked(index);
            return;
        }
        while index.total_cost() > limit {
            if !self.evict_tail_locked(index) {
                break;
            }
        }
    }

    fn trim_to_age_locked(&self, index: &mut RecencyIndex, max_age: Duration) {
        if max_age.is_zero() {
            self.remove_all_locked(index);
            return;
        }
        let cutoff = match SystemTime::now().checked_sub(max_age) {
            Some(cutoff) => cutoff,
            // Age window covers all representable time; nothing can be older.
            None => return,
        };
        while let Some(tail) = index.tail_entry() {
            if tail.last_access >= cutoff {
                break;
            }
            if !self.evict_tail_locked(index) {
                break;
            }
        }
    }

    /// Evict the tail entry: delete its file, then drop it from the index.
    ///
    /// Returns false when no further progress is possible. A deletion
    /// failure other than NotFound aborts the surrounding trim pass rather
    /// than reconsidering the same tail forever; a later trim retries.
    fn evict_tail_locked(&self, index: &mut RecencyIndex) -> bool {
        let tail = match index.tail_entry() {
            Some(tail) => tail,
            None => return false,
        };
        let path = self.path_for(&tail.key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            // Externally deleted file still counts as evicted.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(
                    "disk store {}: trim aborted, could not evict {:?}: {}",
                    self.name(),
                    path,
                    e
                );
                return false;
            }
        }
        index.remove(&tail.key);
        self.shared.stats.record_eviction();
        true
    }

    fn remove_all_locked(&self, index: &mut RecencyIndex) {
        if let Err(e) = fs::remove_dir_all(&self.shared.directory) {
            if e.kind() != ErrorKind::NotFound {
                log::warn!(
                    "disk store {}: could not remove {:?}: {}",
                    self.name(),
                    self.shared.directory,
                    e
                );
            }
        }
        if let Err(e) = fs::create_dir_all(&self.shared.directory) {
            log::warn!(
                "disk store {}: could not recreate {:?}: {}",
                self.name(),
                self.shared.directory,
                e
            );
        }
        index.clear();
    }
}

/// Rebuild the recency index from file metadata.
///
/// Files are inserted ascending by modification time so the newest ends up
/// at the head and the oldest at the tail, preserving the recency contract
/// across process restarts.
fn bootstrap_scan(directory: &Path, index: &mut RecencyIndex) {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                log::debug!("bootstrap scan of {:?} failed: {}", directory, e);
            }
            return;
        }
    };

    let mut found: Vec<(String, u64, SystemTime)> = Vec::new();
    for entry in entries.flatten() {
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if !metadata.is_file() {
            continue;
        }
        let key = match entry.file_name().into_string() {
            Ok(key) => key,
            Err(_) => continue,
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((key, metadata.len(), modified));
    }

    found.sort_by_key(|(_, _, modified)| *modified);
    for (key, cost, modified) in found {
        index.upsert(&key, cost, modified);
    }
}

/// Keys double as file names; reject anything that would escape the
/// instance directory.
fn key_is_storable(key: &str) -> bool {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        log::warn!("cache key {:?} is not a valid file name, ignoring", key);
        return false;
    }
    true
}

fn stamp_modified(path: &Path, time: SystemTime) -> std::io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_modified(time)
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
