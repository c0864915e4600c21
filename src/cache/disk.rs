//! Disk tier: one JSON file per key inside a directory the tier owns.
//!
//! File names are the hex SHA-256 of the key plus `.cache`; the key itself is stored in
//! the record and checked on read. Each file operation holds one of a fixed set of lock
//! stripes, chosen from the file name's hash prefix, for the duration of that operation
//! only. Keys on different stripes never serialise.
//! Writes go to a sibling `.tmp` file and are renamed into place, so a reader never
//! observes a half-written record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::clock::is_expired;
use crate::cache::key::CacheKey;
use crate::core::features::ExtractionOutput;
use crate::error::{CacheTier, ExtractError, ExtractResult};

const ENTRY_EXTENSION: &str = "cache";

/// Number of file lock stripes.
pub const LOCK_STRIPES: usize = 64;

/// On-disk representation of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRecord {
    pub key: CacheKey,
    pub data: ExtractionOutput,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub ttl_secs: u64,
}

impl DiskRecord {
    pub fn new(key: CacheKey, data: ExtractionOutput, created_at: SystemTime, ttl: Duration) -> Self {
        let timestamp_ms = created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            key,
            data,
            timestamp_ms,
            ttl_secs: ttl.as_secs(),
        }
    }

    pub fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.timestamp_ms)
    }
}

/// Disk tier of the feature cache.
#[derive(Debug)]
pub struct DiskTier {
    dir: PathBuf,
    ttl: Duration,
    locks: Box<[Mutex<()>]>,
}

impl DiskTier {
    /// Opens (creating if absent) the tier directory.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> ExtractResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ExtractError::io_at("create cache directory", &dir, e))?;
        Ok(Self {
            dir,
            ttl,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Stripe guarding `path`. Entry file names start with hex digest digits.
    fn lock_for(&self, path: &Path) -> &Mutex<()> {
        let stripe = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.get(..4))
            .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
            .unwrap_or(0);
        &self.locks[stripe % self.locks.len()]
    }

    pub fn lock_stripes(&self) -> usize {
        self.locks.len()
    }

    /// Reads a fresh record for `key`.
    ///
    /// Missing, expired and foreign (hash-colliding) files read as `None`. Expired files
    /// are deleted. A file that cannot be parsed is deleted and reported as an error.
    pub fn read(&self, key: &CacheKey, now: SystemTime) -> ExtractResult<Option<DiskRecord>> {
        let path = self.path_for(key);
        let _guard = self.lock_for(&path).lock();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ExtractError::io_at("read cache entry", &path, e)),
        };

        let record: DiskRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                let _ = fs::remove_file(&path);
                return Err(ExtractError::cache(
                    CacheTier::Disk,
                    key.as_str(),
                    format!("corrupt entry removed: {e}"),
                ));
            }
        };

        if record.key != *key {
            return Ok(None);
        }
        if is_expired(now, record.created_at(), self.ttl) {
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Writes `record`, replacing any previous file for its key.
    pub fn write(&self, record: &DiskRecord) -> ExtractResult<()> {
        let encoded = serde_json::to_vec(record).map_err(|e| {
            ExtractError::cache(CacheTier::Disk, record.key.as_str(), format!("encode: {e}"))
        })?;

        let path = self.path_for(&record.key);
        let staging = path.with_extension("tmp");
        let _guard = self.lock_for(&path).lock();

        fs::write(&staging, &encoded)
            .map_err(|e| ExtractError::io_at("write cache entry", &staging, e))?;
        fs::rename(&staging, &path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            ExtractError::io_at("commit cache entry", &path, e)
        })
    }

    /// Deletes the file for `key`. Returns whether one existed.
    pub fn remove(&self, key: &CacheKey) -> ExtractResult<bool> {
        let path = self.path_for(key);
        let _guard = self.lock_for(&path).lock();
        remove_if_present(&path)
    }

    /// Deletes every entry file. Returns how many were removed.
    pub fn clear(&self) -> ExtractResult<usize> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            let _guard = self.lock_for(&path).lock();
            if remove_if_present(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deletes entry files whose modification time is older than the TTL.
    pub fn purge_expired(&self, now: SystemTime) -> ExtractResult<usize> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            let _guard = self.lock_for(&path).lock();
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if is_expired(now, modified, self.ttl) && remove_if_present(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of entry files and their total size in bytes.
    pub fn usage(&self) -> ExtractResult<(usize, u64)> {
        let mut entries = 0;
        let mut bytes = 0;
        for path in self.entry_paths()? {
            if let Ok(metadata) = fs::metadata(&path) {
                entries += 1;
                bytes += metadata.len();
            }
        }
        Ok((entries, bytes))
    }

    fn entry_paths(&self) -> ExtractResult<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ExtractError::io_at("list cache directory", &self.dir, e)),
        };

        let mut paths = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| ExtractError::io_at("list cache directory", &self.dir, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn remove_if_present(path: &Path) -> ExtractResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ExtractError::io_at("remove cache entry", path, e)),
    }
}
