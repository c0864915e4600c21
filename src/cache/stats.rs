//! Cache statistics tracking and reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated without locking.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    memory_evictions: AtomicU64,
    disk_writes: AtomicU64,
    disk_write_failures: AtomicU64,
    disk_read_failures: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_memory_evictions(&self, count: u64) {
        self.memory_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_write(&self) {
        self.disk_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_write_failure(&self) {
        self.disk_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_read_failure(&self) {
        self.disk_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.memory_hits,
            &self.disk_hits,
            &self.misses,
            &self.memory_evictions,
            &self.disk_writes,
            &self.disk_write_failures,
            &self.disk_read_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Snapshot combined with the tier occupancy measured by the caller.
    pub(crate) fn snapshot(&self, occupancy: TierOccupancy) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_evictions: self.memory_evictions.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            disk_write_failures: self.disk_write_failures.load(Ordering::Relaxed),
            disk_read_failures: self.disk_read_failures.load(Ordering::Relaxed),
            memory_bytes: occupancy.memory_bytes,
            memory_entries: occupancy.memory_entries,
            disk_bytes: occupancy.disk_bytes,
            disk_entries: occupancy.disk_entries,
        }
    }
}

/// Current size of both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TierOccupancy {
    pub memory_bytes: u64,
    pub memory_entries: usize,
    pub disk_bytes: u64,
    pub disk_entries: usize,
}

/// Read-only view of cache activity, recomputed on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub memory_evictions: u64,
    pub disk_writes: u64,
    pub disk_write_failures: u64,
    pub disk_read_failures: u64,
    pub memory_bytes: u64,
    pub memory_entries: usize,
    pub disk_bytes: u64,
    pub disk_entries: usize,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    /// Hits over lookups (0.0 to 1.0); 0.0 before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn memory_usage_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn disk_usage_mb(&self) -> f64 {
        self.disk_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Entries across both tiers; a promoted entry counts twice.
    pub fn total_entries(&self) -> usize {
        self.memory_entries + self.disk_entries
    }
}
