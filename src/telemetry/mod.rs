//! Per-tier cache statistics
//!
//! Atomic counters padded to cache-line size so concurrent updates from
//! worker threads do not false-share.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Atomic hit/miss/write/eviction counters for one tier.
#[derive(Debug, Default)]
pub struct TierStatistics {
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    writes: CachePadded<AtomicU64>,
    evictions: CachePadded<AtomicU64>,
}

/// Point-in-time copy of one tier's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

impl TierStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierStatsSnapshot {
        TierStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl TierStatsSnapshot {
    /// Hit rate over all lookups, 1.0 when no lookups have happened.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 1.0;
        }
        self.hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = TierStatistics::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_write();
        stats.record_eviction();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.evictions, 1);
        assert!((snapshot.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_reports_full_hit_rate() {
        assert_eq!(TierStatsSnapshot::default().hit_rate(), 1.0);
    }
}
