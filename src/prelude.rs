//! Convenience re-exports of the public API

pub use crate::cache::config::{CacheConfig, TierLimits, WorkerConfig};
pub use crate::cache::coordinator::TieredCache;
pub use crate::cache::recency::{CacheEntry, RecencyIndex};
pub use crate::cache::serde::BincodeCodec;
pub use crate::cache::tier::{DiskStore, MemoryStore};
pub use crate::cache::traits::{CacheOperationError, ObjectCodec};
pub use crate::permacache::{Permacache, PermacacheBuilder};
pub use crate::telemetry::TierStatsSnapshot;
