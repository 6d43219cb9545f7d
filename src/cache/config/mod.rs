//! Cache configuration types
//!
//! Read/write limits live on the stores themselves; this module holds the
//! construction-time configuration and its validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::traits::CacheOperationError;

/// Prefix for per-cache instance directories.
///
/// The directory name is derived deterministically from the cache name, so
/// two instances constructed with the same name and base path share one
/// backing directory (same files, independent in-memory indices). Callers
/// who do that must tolerate index staleness between the instances.
pub const DIRECTORY_PREFIX: &str = "permacache.";

/// Effectively-unbounded count limit default.
pub const UNBOUNDED_COUNT: usize = usize::MAX;

/// Effectively-unbounded cost limit default, in bytes.
pub const UNBOUNDED_COST: u64 = u64::MAX;

/// Effectively-unbounded age limit default.
pub const UNBOUNDED_AGE: Duration = Duration::MAX;

/// Eviction limits for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum number of live entries
    pub count_limit: usize,
    /// Maximum aggregate cost in bytes
    pub cost_limit: u64,
    /// Maximum entry age; zero means the tier holds nothing
    pub age_limit: Duration,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            count_limit: UNBOUNDED_COUNT,
            cost_limit: UNBOUNDED_COST,
            age_limit: UNBOUNDED_AGE,
        }
    }
}

/// Worker pool configuration for asynchronous operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Threads per store work queue
    pub thread_pool_size: u8,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: 2,
        }
    }
}

/// Main cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Logical cache name; also names the instance directory
    pub cache_name: String,
    /// Base path under which the instance directory is created
    pub base_dir: PathBuf,
    /// Memory tier limits
    pub memory: TierLimits,
    /// Disk tier limits
    pub disk: TierLimits,
    /// Worker pool settings
    pub worker: WorkerConfig,
}

impl CacheConfig {
    /// Configuration with default (unbounded) limits.
    pub fn new(cache_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_name: cache_name.into(),
            base_dir: base_dir.into(),
            memory: TierLimits::default(),
            disk: TierLimits::default(),
            worker: WorkerConfig::default(),
        }
    }

    /// Validate construction-time requirements.
    ///
    /// An empty name or empty base path fails construction outright; these
    /// are the only errors the cache ever surfaces to callers.
    pub fn validate(&self) -> Result<(), CacheOperationError> {
        if self.cache_name.is_empty() {
            return Err(CacheOperationError::configuration_error(
                "cache name must not be empty",
            ));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(CacheOperationError::configuration_error(
                "base path must not be empty",
            ));
        }
        Ok(())
    }

    /// Instance directory for this configuration.
    pub fn storage_directory(&self) -> PathBuf {
        storage_directory(&self.base_dir, &self.cache_name)
    }
}

/// Derive the instance directory from a base path and cache name.
pub fn storage_directory(base_dir: &Path, cache_name: &str) -> PathBuf {
    base_dir.join(format!("{}{}", DIRECTORY_PREFIX, cache_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_empty_name_and_path() {
        assert!(CacheConfig::new("", "/tmp").validate().is_err());
        assert!(CacheConfig::new("images", "").validate().is_err());
        assert!(CacheConfig::new("images", "/tmp").validate().is_ok());
    }

    #[test]
    fn storage_directory_is_deterministic() {
        let a = CacheConfig::new("thumbs", "/var/cache");
        let b = CacheConfig::new("thumbs", "/var/cache");
        assert_eq!(a.storage_directory(), b.storage_directory());
        assert_eq!(
            a.storage_directory(),
            PathBuf::from("/var/cache/permacache.thumbs")
        );
    }
}
