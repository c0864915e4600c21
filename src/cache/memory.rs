//! In-memory tier with TTL and LRU eviction.
//!
//! Everything lives behind one `RwLock`. Lookups that move an entry in the recency order
//! take the write path; [`MemoryTier::contains`] and the size accessors only read.
//!
//! Recency is a monotonically increasing tick per touch, indexed in a `BTreeMap` so the
//! least recently used entry is always the first key.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::cache::clock::is_expired;
use crate::cache::key::CacheKey;
use crate::core::features::ExtractionOutput;

#[derive(Debug, Clone)]
struct MemoryEntry {
    output: ExtractionOutput,
    created_at: SystemTime,
    /// Serialised size charged against the budget.
    size: u64,
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, MemoryEntry>,
    recency: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    size_bytes: u64,
}

impl Inner {
    fn take_tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<MemoryEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.size_bytes -= entry.size;
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.size_bytes -= entry.size;
        }
        true
    }
}

/// Outcome of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored after evicting this many older entries.
    Stored { evicted: u64 },
    /// Larger than the whole budget; not stored.
    TooLarge,
}

/// Memory tier of the feature cache.
#[derive(Debug)]
pub struct MemoryTier {
    inner: RwLock<Inner>,
    max_bytes: u64,
    ttl: Duration,
}

impl MemoryTier {
    pub fn new(max_bytes: u64, ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_bytes,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Returns a fresh entry and marks it most recently used.
    ///
    /// An expired entry is removed on sight and reported as absent.
    pub fn get(&self, key: &CacheKey, now: SystemTime) -> Option<ExtractionOutput> {
        let mut inner = self.inner.write();

        let created_at = inner.entries.get(key)?.created_at;
        if is_expired(now, created_at, self.ttl) {
            inner.remove(key);
            return None;
        }

        let tick = inner.take_tick();
        let entry = inner.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let output = entry.output.clone();
        inner.recency.remove(&old_tick);
        inner.recency.insert(tick, key.clone());
        Some(output)
    }

    /// Whether `key` is present, fresh or not. Does not affect recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Stores `output` as the most recently used entry, replacing any entry for `key`.
    ///
    /// Least recently used entries are evicted first until the new entry fits, even if
    /// they are still fresh.
    pub fn insert(&self, key: CacheKey, output: ExtractionOutput, now: SystemTime) -> InsertOutcome {
        let size = entry_size(&output);
        let mut inner = self.inner.write();
        inner.remove(&key);

        if size > self.max_bytes {
            return InsertOutcome::TooLarge;
        }

        let mut evicted = 0;
        while inner.size_bytes + size > self.max_bytes && inner.evict_lru() {
            evicted += 1;
        }

        let tick = inner.take_tick();
        inner.recency.insert(tick, key.clone());
        inner.size_bytes += size;
        inner.entries.insert(
            key,
            MemoryEntry {
                output,
                created_at: now,
                size,
                tick,
            },
        );
        InsertOutcome::Stored { evicted }
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.write().remove(key).is_some()
    }

    /// Drops every entry older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let mut inner = self.inner.write();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| is_expired(now, entry.created_at, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.recency.clear();
        inner.size_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.read().size_bytes
    }
}

/// Bytes an entry is charged: the length of its JSON encoding.
pub fn entry_size(output: &ExtractionOutput) -> u64 {
    serde_json::to_vec(output)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}
