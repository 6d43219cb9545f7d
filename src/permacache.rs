//! Simple public API for the permacache tiered cache
//!
//! A caller-owned cache instance wrapping the tiered coordinator, with a
//! fluent builder for configuration. There is no process-wide shared
//! instance; construct one and pass it around (clones are cheap and share
//! the underlying tiers).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::config::{CacheConfig, TierLimits, WorkerConfig};
use crate::cache::coordinator::TieredCache;
use crate::cache::serde::BincodeCodec;
use crate::cache::tier::{DiskStore, MemoryStore};
use crate::cache::traits::{CacheOperationError, ObjectCodec};

/// Tiered object cache: an in-memory tier backed by a persistent on-disk
/// tier, each independently trimmed under count, cost, and age limits.
pub struct Permacache<V> {
    cache: TieredCache<V>,
}

impl<V> Clone for Permacache<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Permacache<V> {
    /// Create a cache builder with fluent configuration.
    pub fn builder(
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
    ) -> PermacacheBuilder<V> {
        PermacacheBuilder::new(name, base_dir)
    }

    /// Store `value` under `key` in both tiers.
    pub fn set(&self, key: &str, value: V) {
        self.cache.set(key, value);
    }

    /// Look up `key`: memory first, disk on a miss, promoting disk hits.
    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    /// Remove `key` from both tiers.
    pub fn remove(&self, key: &str) {
        self.cache.remove(key);
    }

    /// Clear both tiers.
    pub fn clear(&self) {
        self.cache.remove_all();
    }

    /// Trim both tiers to `max_age`.
    pub fn trim_to_age(&self, max_age: Duration) {
        self.cache.trim_to_age(max_age);
    }

    /// Asynchronous [`set`](Self::set); fires once after both tiers finish.
    pub fn set_async<F>(&self, key: impl Into<String>, value: V, completion: F)
    where
        F: FnOnce(&Permacache<V>, &str, Option<V>) + Send + 'static,
    {
        self.cache.set_async(key, value, move |tiered, key, value| {
            let cache = Permacache {
                cache: tiered.clone(),
            };
            completion(&cache, key, value);
        });
    }

    /// Asynchronous [`get`](Self::get).
    pub fn get_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&Permacache<V>, &str, Option<V>) + Send + 'static,
    {
        self.cache.get_async(key, move |tiered, key, value| {
            let cache = Permacache {
                cache: tiered.clone(),
            };
            completion(&cache, key, value);
        });
    }

    /// Asynchronous [`remove`](Self::remove); fires once after both tiers
    /// finish.
    pub fn remove_async<F>(&self, key: impl Into<String>, completion: F)
    where
        F: FnOnce(&Permacache<V>, &str) + Send + 'static,
    {
        self.cache.remove_async(key, move |tiered, key| {
            let cache = Permacache {
                cache: tiered.clone(),
            };
            completion(&cache, key);
        });
    }

    /// Asynchronous [`clear`](Self::clear); fires once after both tiers
    /// finish.
    pub fn clear_async<F>(&self, completion: F)
    where
        F: FnOnce(&Permacache<V>) + Send + 'static,
    {
        self.cache.remove_all_async(move |tiered| {
            let cache = Permacache {
                cache: tiered.clone(),
            };
            completion(&cache);
        });
    }

    /// Asynchronous [`trim_to_age`](Self::trim_to_age); fires once after
    /// both tiers finish.
    pub fn trim_to_age_async<F>(&self, max_age: Duration, completion: F)
    where
        F: FnOnce(&Permacache<V>) + Send + 'static,
    {
        self.cache.trim_to_age_async(max_age, move |tiered| {
            let cache = Permacache {
                cache: tiered.clone(),
            };
            completion(&cache);
        });
    }

    /// Memory tier handle, for limits and statistics.
    pub fn memory(&self) -> &MemoryStore<V> {
        self.cache.memory()
    }

    /// Disk tier handle, for limits and statistics.
    pub fn disk(&self) -> &DiskStore<V> {
        self.cache.disk()
    }

    /// Underlying tiered coordinator.
    pub fn tiered(&self) -> &TieredCache<V> {
        &self.cache
    }

    /// Cache statistics as a formatted string.
    pub fn stats(&self) -> String {
        let memory = self.memory().stats();
        let disk = self.disk().stats();
        format!(
            "{{\"memory\":{{\"hits\":{},\"misses\":{},\"writes\":{},\"evictions\":{},\"entries\":{},\"cost\":{}}},\"disk\":{{\"hits\":{},\"misses\":{},\"writes\":{},\"evictions\":{},\"entries\":{},\"cost\":{}}}}}",
            memory.hits,
            memory.misses,
            memory.writes,
            memory.evictions,
            self.memory().count(),
            self.memory().total_cost(),
            disk.hits,
            disk.misses,
            disk.writes,
            disk.evictions,
            self.disk().count(),
            self.disk().total_cost(),
        )
    }
}

/// Fluent builder for [`Permacache`].
pub struct PermacacheBuilder<V> {
    config: CacheConfig,
    codec: Option<Arc<dyn ObjectCodec<V>>>,
}

impl<V: Clone + Send + Sync + 'static> PermacacheBuilder<V> {
    /// Start a builder for a cache named `name` rooted under `base_dir`.
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: CacheConfig::new(name, base_dir),
            codec: None,
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            codec: None,
        }
    }

    pub fn memory_count_limit(mut self, limit: usize) -> Self {
        self.config.memory.count_limit = limit;
        self
    }

    pub fn memory_cost_limit(mut self, limit: u64) -> Self {
        self.config.memory.cost_limit = limit;
        self
    }

    pub fn memory_age_limit(mut self, limit: Duration) -> Self {
        self.config.memory.age_limit = limit;
        self
    }

    pub fn disk_count_limit(mut self, limit: usize) -> Self {
        self.config.disk.count_limit = limit;
        self
    }

    pub fn disk_cost_limit(mut self, limit: u64) -> Self {
        self.config.disk.cost_limit = limit;
        self
    }

    pub fn disk_age_limit(mut self, limit: Duration) -> Self {
        self.config.disk.age_limit = limit;
        self
    }

    /// Worker threads per store work queue.
    pub fn worker_threads(mut self, threads: u8) -> Self {
        self.config.worker = WorkerConfig {
            thread_pool_size: threads,
        };
        self
    }

    /// Replace the default bincode codec for disk serialization.
    pub fn codec(mut self, codec: Arc<dyn ObjectCodec<V>>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Validate the configuration and construct the cache.
    ///
    /// Fails only on an empty cache name or base path.
    pub fn build(self) -> Result<Permacache<V>, CacheOperationError>
    where
        V: Serialize + DeserializeOwned,
    {
        self.config.validate()?;
        let threads = usize::from(self.config.worker.thread_pool_size);
        let codec = self.codec.unwrap_or_else(|| Arc::new(BincodeCodec));

        let memory = MemoryStore::new(self.config.memory, threads);
        let disk = DiskStore::new(
            &self.config.cache_name,
            &self.config.base_dir,
            self.config.disk,
            threads,
            codec,
        )?;

        Ok(Permacache {
            cache: TieredCache::new(memory, disk),
        })
    }
}
