//! Two-tier feature cache.
//!
//! ```text
//! get:  memory ──hit──▶ return
//!         │ miss/expired
//!         ▼
//!       disk ──hit──▶ promote to memory ──▶ return
//!         │ miss/expired/corrupt
//!         ▼
//!       miss
//!
//! set:  memory (synchronous) ──▶ disk (ordered writer thread, failures logged)
//! ```
//!
//! Disk failures never reach the caller: a failed read is a miss and a failed write is a
//! counter and a log line. A disabled cache misses every lookup and drops every store.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::disk::{DiskRecord, DiskTier};
use crate::cache::key::CacheKey;
use crate::cache::memory::{InsertOutcome, MemoryTier};
use crate::cache::stats::{CacheCounters, CacheStats, TierOccupancy};
use crate::cache::sweeper::Sweeper;
use crate::cache::writer::DiskWriter;
use crate::config::CacheConfig;
use crate::core::features::ExtractionOutput;
use crate::error::ExtractResult;

/// Entries removed by one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub memory_removed: usize,
    pub disk_removed: usize,
}

#[derive(Debug)]
struct Shared {
    memory: MemoryTier,
    disk: Option<DiskTier>,
    clock: Arc<dyn Clock>,
    counters: CacheCounters,
}

impl Shared {
    fn promote(&self, key: &CacheKey, output: ExtractionOutput) {
        let now = self.clock.now();
        match self.memory.insert(key.clone(), output, now) {
            InsertOutcome::Stored { evicted } if evicted > 0 => {
                self.counters.record_memory_evictions(evicted);
                debug!(evicted, "memory tier evicted least recently used entries");
            }
            InsertOutcome::Stored { .. } => {}
            InsertOutcome::TooLarge => {
                debug!(key = %key, "entry exceeds memory budget; kept on disk only");
            }
        }
    }

    fn write_to_disk(&self, record: &DiskRecord) {
        let Some(disk) = &self.disk else {
            return;
        };
        match disk.write(record) {
            Ok(()) => self.counters.record_disk_write(),
            Err(e) => {
                self.counters.record_disk_write_failure();
                error!(key = %record.key, error = %e, "asynchronous disk cache write failed");
            }
        }
    }

    fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let memory_removed = self.memory.purge_expired(now);
        let disk_removed = match &self.disk {
            Some(disk) => disk.purge_expired(now).unwrap_or_else(|e| {
                warn!(error = %e, "disk cache sweep failed");
                0
            }),
            None => 0,
        };
        if memory_removed + disk_removed > 0 {
            debug!(memory_removed, disk_removed, "expired cache entries removed");
        }
        SweepReport {
            memory_removed,
            disk_removed,
        }
    }
}

/// Memory plus disk memoization of extraction results.
///
/// Owned by one extractor; there is no process-wide cache.
///
/// ```rust
/// use ballistic_features::cache::{CacheKey, FeatureCache};
/// use ballistic_features::config::CacheConfig;
/// use ballistic_features::core::features::ExtractionOutput;
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = CacheConfig { directory: dir.path().to_path_buf(), ..Default::default() };
/// let cache = FeatureCache::new(&config).unwrap();
///
/// let key = CacheKey::new("case_17.png_800x600");
/// cache.set(key.clone(), ExtractionOutput::default());
/// assert_eq!(cache.get(&key), Some(ExtractionOutput::default()));
///
/// cache.cleanup();
/// ```
#[derive(Debug)]
pub struct FeatureCache {
    enabled: bool,
    shared: Arc<Shared>,
    /// Held across the memory update and the enqueue so both tiers see one order.
    writer: Mutex<Option<DiskWriter>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl FeatureCache {
    /// Opens the cache on the system clock and starts the expiry sweeper.
    pub fn new(config: &CacheConfig) -> ExtractResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Opens the cache on `clock`.
    ///
    /// When `config.enabled` is false no directory is created and no sweeper runs.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> ExtractResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled_with_clock(clock));
        }
        config.validate()?;

        let disk = DiskTier::open(&config.directory, config.disk_ttl())?;
        let shared = Arc::new(Shared {
            memory: MemoryTier::new(config.max_memory_bytes(), config.memory_ttl()),
            disk: Some(disk),
            clock,
            counters: CacheCounters::default(),
        });

        let write_target = Arc::clone(&shared);
        let writer = DiskWriter::spawn("bfx-disk-writer", move |record| {
            write_target.write_to_disk(record);
        })?;

        let sweep_target = Arc::clone(&shared);
        let sweeper = Sweeper::spawn("bfx-cache-sweeper", config.cleanup_interval(), move || {
            sweep_target.sweep();
        })?;

        debug!(
            directory = %config.directory.display(),
            memory_ttl_secs = config.memory_ttl_secs,
            disk_ttl_secs = config.disk_ttl_secs,
            max_memory_mb = config.max_memory_mb,
            "feature cache opened"
        );

        Ok(Self {
            enabled: true,
            shared,
            writer: Mutex::new(Some(writer)),
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::disabled_with_clock(Arc::new(SystemClock))
    }

    fn disabled_with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: false,
            shared: Arc::new(Shared {
                memory: MemoryTier::new(0, Default::default()),
                disk: None,
                clock,
                counters: CacheCounters::default(),
            }),
            writer: Mutex::new(None),
            sweeper: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn directory(&self) -> Option<&Path> {
        self.shared.disk.as_ref().map(DiskTier::dir)
    }

    /// Derives a key from a prefix and arbitrary serialisable parameters.
    pub fn generate_key<P: Serialize + ?Sized>(prefix: &str, params: &P) -> ExtractResult<CacheKey> {
        CacheKey::from_params(prefix, params)
    }

    /// Looks `key` up in memory, then on disk.
    ///
    /// A disk hit is copied into the memory tier with a fresh timestamp.
    pub fn get(&self, key: &CacheKey) -> Option<ExtractionOutput> {
        let counters = &self.shared.counters;
        if !self.enabled {
            counters.record_miss();
            return None;
        }

        let now = self.shared.clock.now();
        if let Some(output) = self.shared.memory.get(key, now) {
            counters.record_memory_hit();
            debug!(key = %key, tier = "memory", "cache hit");
            return Some(output);
        }

        if let Some(disk) = &self.shared.disk {
            match disk.read(key, now) {
                Ok(Some(record)) => {
                    self.shared.promote(key, record.data.clone());
                    counters.record_disk_hit();
                    debug!(key = %key, tier = "disk", "cache hit");
                    return Some(record.data);
                }
                Ok(None) => {}
                Err(e) => {
                    counters.record_disk_read_failure();
                    warn!(key = %key, error = %e, "disk cache read failed; treating as miss");
                }
            }
        }

        counters.record_miss();
        debug!(key = %key, "cache miss");
        None
    }

    /// Stores `output` under `key`, replacing any previous entry.
    ///
    /// The memory tier is updated before this returns; the disk write is queued to the
    /// writer thread behind every earlier `set`, so the last store for a key is also the
    /// last one on disk. Call [`flush`](Self::flush) to wait for queued disk writes.
    pub fn set(&self, key: CacheKey, output: ExtractionOutput) {
        if !self.enabled {
            return;
        }

        let writer = self.writer.lock();
        self.shared.promote(&key, output.clone());

        let Some(disk) = &self.shared.disk else {
            return;
        };
        let Some(writer) = writer.as_ref() else {
            debug!(key = %key, "cache shut down; entry kept in memory only");
            return;
        };
        let record = DiskRecord::new(key, output, self.shared.clock.now(), disk.ttl());
        if !writer.enqueue(record) {
            self.shared.counters.record_disk_write_failure();
            error!("disk cache writer is gone; entry kept in memory only");
        }
    }

    /// Removes `key` from both tiers. Returns whether anything was removed.
    pub fn delete(&self, key: &CacheKey) -> ExtractResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let writer = self.writer.lock();
        if let Some(writer) = writer.as_ref() {
            writer.flush();
        }
        let in_memory = self.shared.memory.remove(key);
        let on_disk = match &self.shared.disk {
            Some(disk) => disk.remove(key)?,
            None => false,
        };
        Ok(in_memory || on_disk)
    }

    /// Empties both tiers. Disk files are deleted before this returns.
    pub fn clear(&self) -> ExtractResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let writer = self.writer.lock();
        if let Some(writer) = writer.as_ref() {
            writer.flush();
        }
        self.shared.memory.clear();
        if let Some(disk) = &self.shared.disk {
            let removed = disk.clear()?;
            debug!(removed, "disk cache cleared");
        }
        Ok(())
    }

    /// Current counters and tier sizes.
    pub fn stats(&self) -> CacheStats {
        if !self.enabled {
            return CacheStats::default();
        }
        let (disk_entries, disk_bytes) = match &self.shared.disk {
            Some(disk) => disk.usage().unwrap_or_else(|e| {
                warn!(error = %e, "could not measure disk cache");
                (0, 0)
            }),
            None => (0, 0),
        };
        self.shared.counters.snapshot(TierOccupancy {
            memory_bytes: self.shared.memory.size_bytes(),
            memory_entries: self.shared.memory.len(),
            disk_bytes,
            disk_entries,
        })
    }

    pub fn reset_stats(&self) {
        self.shared.counters.reset();
    }

    /// Runs one expiry sweep now, independent of the background schedule.
    pub fn sweep_expired(&self) -> SweepReport {
        if !self.enabled {
            return SweepReport::default();
        }
        self.shared.sweep()
    }

    /// Waits until every disk write queued before this call has landed.
    pub fn flush(&self) {
        if let Some(writer) = self.writer.lock().as_ref() {
            writer.flush();
        }
    }

    /// Stops the sweeper, then writes the disk backlog and stops the writer. Idempotent.
    ///
    /// Later stores only reach the memory tier.
    pub fn cleanup(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        if let Some(mut writer) = self.writer.lock().take() {
            writer.stop();
        }
    }
}

impl Drop for FeatureCache {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::core::features::LocalFeatures;
    use std::time::Duration;

    fn output(circularity: f64) -> ExtractionOutput {
        ExtractionOutput::new(
            LocalFeatures {
                circularity,
                image_width: 8.0,
                image_height: 8.0,
                image_area: 64.0,
                ..Default::default()
            },
            Default::default(),
        )
    }

    fn open(dir: &Path, clock: Arc<ManualClock>) -> FeatureCache {
        let config = CacheConfig {
            directory: dir.to_path_buf(),
            memory_ttl_secs: 300,
            disk_ttl_secs: 1800,
            ..Default::default()
        };
        FeatureCache::with_clock(&config, clock).unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(ManualClock::new()));
        let key = CacheKey::new("a.png_8x8");

        cache.set(key.clone(), output(0.9));
        assert_eq!(cache.get(&key), Some(output(0.9)));

        let stats = cache.stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_miss_counts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(ManualClock::new()));
        assert_eq!(cache.get(&CacheKey::new("absent")), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_memory_expiry_falls_back_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let cache = open(dir.path(), Arc::clone(&clock));
        let key = CacheKey::new("a.png_8x8");

        cache.set(key.clone(), output(0.4));
        cache.flush();

        clock.advance(Duration::from_secs(301));
        assert_eq!(cache.get(&key), Some(output(0.4)));
        let stats = cache.stats();
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.disk_writes, 1);

        // Promoted with a fresh timestamp: served from memory for another full TTL.
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(&key), Some(output(0.4)));
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[test]
    fn test_miss_after_both_ttls() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let cache = open(dir.path(), Arc::clone(&clock));
        let key = CacheKey::new("a.png_8x8");

        cache.set(key.clone(), output(0.4));
        cache.flush();
        clock.advance(Duration::from_secs(1801));

        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_delete_removes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(ManualClock::new()));
        let key = CacheKey::new("a.png_8x8");
        cache.set(key.clone(), output(0.4));

        assert!(cache.delete(&key).unwrap());
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.stats().disk_entries, 0);
    }

    #[test]
    fn test_clear_is_synchronous() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(ManualClock::new()));
        for i in 0..5 {
            cache.set(CacheKey::new(format!("img{i}.png_8x8")), output(i as f64));
        }
        cache.clear().unwrap();

        let stats = cache.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.disk_entries, 0);
        assert_eq!(stats.disk_bytes, 0);
    }

    #[test]
    fn test_failed_disk_write_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(ManualClock::new()));
        let key = CacheKey::new("a.png_8x8");

        // Occupy the staging path with a directory so the write cannot land.
        let staging = dir.path().join(key.file_name()).with_extension("tmp");
        std::fs::create_dir(&staging).unwrap();

        cache.set(key.clone(), output(0.4));
        cache.flush();

        assert_eq!(cache.get(&key), Some(output(0.4)));
        assert_eq!(cache.stats().disk_write_failures, 1);
    }

    #[test]
    fn test_later_set_wins_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let cache = open(dir.path(), Arc::clone(&clock));
        let key = CacheKey::new("a.png_8x8");

        // A large first value takes far longer to encode than the second.
        let mut slow = output(0.1);
        slow.advanced = (0..200_000).map(|i| (format!("m{i}"), i as f64)).collect();
        cache.set(key.clone(), slow);
        cache.set(key.clone(), output(0.9));
        cache.flush();

        clock.advance(Duration::from_secs(301));
        assert_eq!(cache.get(&key), Some(output(0.9)));
        assert_eq!(cache.stats().disk_hits, 1);
        assert_eq!(cache.stats().disk_writes, 2);
    }

    #[test]
    fn test_set_after_cleanup_stays_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(ManualClock::new()));
        cache.cleanup();

        let key = CacheKey::new("late.png_8x8");
        cache.set(key.clone(), output(0.3));
        cache.flush();
        assert_eq!(cache.get(&key), Some(output(0.3)));
        assert_eq!(cache.stats().disk_entries, 0);
        assert_eq!(cache.stats().disk_write_failures, 0);
    }

    #[test]
    fn test_sweep_expired() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let cache = open(dir.path(), Arc::clone(&clock));
        cache.set(CacheKey::new("a"), output(0.1));
        cache.flush();

        clock.advance(Duration::from_secs(3600));
        let report = cache.sweep_expired();
        assert_eq!(report.memory_removed, 1);
        assert_eq!(report.disk_removed, 1);
    }

    #[test]
    fn test_disabled_cache() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never-created");
        let config = CacheConfig {
            enabled: false,
            directory: target.clone(),
            ..Default::default()
        };
        let cache = FeatureCache::new(&config).unwrap();
        let key = CacheKey::new("a");

        cache.set(key.clone(), output(0.4));
        assert_eq!(cache.get(&key), None);
        assert!(!cache.delete(&key).unwrap());
        cache.clear().unwrap();
        assert!(!target.exists());
        assert!(cache.directory().is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_generate_key() {
        let a = FeatureCache::generate_key("features", &("a.png", 1, 2)).unwrap();
        let b = FeatureCache::generate_key("features", &("a.png", 1, 2)).unwrap();
        assert_eq!(a, b);
    }
}
