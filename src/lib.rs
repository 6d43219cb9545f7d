//! Permacache - Tiered persistent object cache
//!
//! An in-memory tier backed by a persistent on-disk tier, each
//! independently subject to least-recently-used eviction under
//! configurable count, cost (byte-size), and age limits.
//!
//! # Features
//!
//! - **Two-tier architecture**: memory front, disk behind, with read
//!   promotion from disk back into memory
//! - **LRU eviction**: per-tier recency index with count/cost/age trimming
//! - **Durable recency**: file modification time and size are the disk
//!   tier's only persistent state; the index rebuilds from metadata on
//!   every cold start
//! - **Callback async**: every operation has an asynchronous form on a
//!   worker pool, with exactly-once join completions for fan-out writes
//! - **Best-effort durability**: filesystem and codec faults degrade to
//!   no-ops or misses instead of surfacing to callers

// Public API modules
pub mod permacache;
pub mod prelude;

// Cache implementation modules - traits are public for user implementations
pub mod cache;
pub mod telemetry;

// Re-export the public API at the crate root for convenience
pub use cache::config::{CacheConfig, TierLimits};
pub use cache::coordinator::TieredCache;
pub use cache::tier::{DiskStore, MemoryStore};
pub use cache::traits::{CacheOperationError, ObjectCodec};
pub use permacache::{Permacache, PermacacheBuilder};
