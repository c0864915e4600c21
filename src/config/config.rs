//! # Configuration Module
//!
//! Configuration structures and validation for the feature pipeline. This is the common
//! interface between the `bfx` command line, JSON configuration files and the library.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Range | Description |
//! |-----------|------|-------|-------------|
//! | `workers` | `usize` | 0 = auto | Worker threads (and regions per image) |
//! | `glcm_offset` | `u32` | 1-3 | Horizontal GLCM pixel offset |
//! | `foreground_threshold` | `u8` | 0-255 | Luminance below which a pixel is foreground |
//! | `temp_dir` | `PathBuf` | Any writable path | Scratch space for the advanced collaborator |
//! | `advanced_max_dimension` | `u32` | > 0 | Longest side handed to the advanced collaborator |
//! | `key_scheme` | `KeyScheme` | name / content | Cache key derivation |
//! | `cache.memory_ttl_secs` | `u64` | > 0, <= disk TTL | Memory tier time-to-live |
//! | `cache.disk_ttl_secs` | `u64` | > 0 | Disk tier time-to-live |
//! | `cache.max_memory_mb` | `u64` | > 0 | Memory tier byte budget |
//!
//! ## Duration Formats
//!
//! [`parse_duration`] accepts:
//! - Raw seconds: `30` or `30s`
//! - Minutes: `2m` (120 seconds)
//! - Hours: `1h` (3600 seconds)
//!
//! ## Examples
//!
//! ```rust
//! use ballistic_features::config::ExtractorConfig;
//!
//! let mut config = ExtractorConfig::default();
//! assert!(config.validate().is_ok());
//!
//! config.glcm_offset = 4;
//! assert!(config.validate().is_err());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, ExtractResult};

/// How cache keys are derived from an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    /// Base filename plus dimensions.
    #[default]
    Name,
    /// Base filename, dimensions and a SHA-256 digest of the pixel bytes.
    Content,
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub output: LogOutput,
    /// Directory for `bfx.log` when `output` is `file`.
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Console,
            directory: PathBuf::from("logs"),
        }
    }
}

/// Two-tier cache configuration.
///
/// Memory TTL is meant for hot, recent requests and is kept short; disk TTL outlives
/// process-local memory pressure but still bounds how long the spill directory grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When `false` every lookup misses and stores are dropped.
    pub enabled: bool,
    /// Directory owned by the disk tier. Created if absent.
    pub directory: PathBuf,
    pub memory_ttl_secs: u64,
    pub disk_ttl_secs: u64,
    /// Memory tier budget in mebibytes of serialised entries.
    pub max_memory_mb: u64,
    /// Period of the background expiry sweep.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    /// Defaults: enabled, `./cache`, 5 minute memory TTL, 30 minute disk TTL,
    /// 100 MiB memory budget, 10 minute sweep.
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./cache"),
            memory_ttl_secs: 300,
            disk_ttl_secs: 1800,
            max_memory_mb: 100,
            cleanup_interval_secs: 600,
        }
    }
}

impl CacheConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn disk_ttl(&self) -> Duration {
        Duration::from_secs(self.disk_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    /// Validates the cache parameters.
    ///
    /// A disabled cache is still validated so that flipping `enabled` back on never
    /// produces an invalid configuration.
    pub fn validate(&self) -> ExtractResult<()> {
        if self.memory_ttl_secs == 0 {
            return Err(ExtractError::config(
                "cache.memory_ttl_secs",
                "0",
                "memory TTL must be greater than 0",
            ));
        }
        if self.disk_ttl_secs == 0 {
            return Err(ExtractError::config(
                "cache.disk_ttl_secs",
                "0",
                "disk TTL must be greater than 0",
            ));
        }
        if self.memory_ttl_secs > self.disk_ttl_secs {
            return Err(ExtractError::config(
                "cache.memory_ttl_secs",
                self.memory_ttl_secs.to_string(),
                format!(
                    "memory TTL must not exceed disk TTL ({}s)",
                    self.disk_ttl_secs
                ),
            ));
        }
        if self.max_memory_mb == 0 {
            return Err(ExtractError::config(
                "cache.max_memory_mb",
                "0",
                "memory budget must be greater than 0",
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ExtractError::config(
                "cache.cleanup_interval_secs",
                "0",
                "cleanup interval must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for an [`OptimizedFeatureExtractor`](crate::OptimizedFeatureExtractor).
///
/// Every field has a default, so a JSON file only needs the values it changes:
///
/// ```rust
/// use ballistic_features::config::ExtractorConfig;
///
/// let config: ExtractorConfig =
///     serde_json::from_str(r#"{ "workers": 4, "cache": { "enabled": false } }"#).unwrap();
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.glcm_offset, 1);
/// assert!(!config.cache.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Worker threads, and therefore regions per image. `0` uses the host logical CPU
    /// count.
    pub workers: usize,

    /// Horizontal pixel distance for GLCM pairs.
    ///
    /// Must be between 1 and 3 (inclusive). Larger offsets sample coarser texture.
    pub glcm_offset: u32,

    /// Luminance threshold for the foreground test.
    ///
    /// A pixel whose `0.299R + 0.587G + 0.114B` value is strictly below this threshold
    /// belongs to the object rather than the background.
    pub foreground_threshold: u8,

    /// Scratch directory for the temporary image handed to the advanced collaborator.
    pub temp_dir: PathBuf,

    /// Images wider or taller than this are downscaled (Lanczos3) before the advanced
    /// collaborator sees them.
    pub advanced_max_dimension: u32,

    pub key_scheme: KeyScheme,

    pub cache: CacheConfig,

    pub logging: LoggingConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            glcm_offset: 1,
            foreground_threshold: 128,
            temp_dir: std::env::temp_dir().join("balistica"),
            advanced_max_dimension: 1024,
            key_scheme: KeyScheme::Name,
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their defaults. The result is validated before it is returned.
    pub fn from_file(path: impl AsRef<Path>) -> ExtractResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::io_at("read configuration", path, e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            ExtractError::from(e)
                .with_operation("parse configuration")
                .with_context(path.display().to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Worker count after resolving `0` to the host logical CPU count.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Sampler parameters shared by every region of every image.
    pub fn sampler_params(&self) -> region_sample::SamplerParams {
        region_sample::SamplerParams {
            glcm_offset: self.glcm_offset,
            foreground_threshold: self.foreground_threshold,
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> ExtractResult<()> {
        if !(1..=3).contains(&self.glcm_offset) {
            return Err(ExtractError::config(
                "glcm_offset",
                self.glcm_offset.to_string(),
                "GLCM offset must be between 1 and 3",
            ));
        }
        if self.advanced_max_dimension == 0 {
            return Err(ExtractError::config(
                "advanced_max_dimension",
                "0",
                "maximum dimension must be greater than 0",
            ));
        }
        self.cache.validate()
    }
}

/// Parse a duration string like "30s", "2m", "1h" (or bare seconds).
pub fn parse_duration(duration: &str) -> ExtractResult<Duration> {
    let duration = duration.trim();
    if let Ok(seconds) = duration.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let len = duration.len();
    if len < 2 || !duration.is_ascii() {
        return Err(ExtractError::validation(
            "duration",
            "format like 30s, 2m or 1h",
            duration,
        ));
    }

    let (num_str, unit) = duration.split_at(len - 1);
    let num: u64 = num_str.parse().map_err(|_| {
        ExtractError::validation("duration", "numeric prefix", duration)
    })?;

    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            return Err(ExtractError::validation(
                "duration",
                "unit must be 's' for seconds, 'm' for minutes or 'h' for hours",
                duration,
            ));
        }
    };
    num.checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| ExtractError::validation("duration", "at most u64::MAX seconds", duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.workers, 0);
        assert_eq!(config.glcm_offset, 1);
        assert_eq!(config.foreground_threshold, 128);
        assert_eq!(config.advanced_max_dimension, 1024);
        assert_eq!(config.key_scheme, KeyScheme::Name);
        assert!(config.temp_dir.ends_with("balistica"));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_memory_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.cache.memory_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.disk_ttl(), Duration::from_secs(1800));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ExtractorConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid offset
        config.glcm_offset = 0;
        assert!(config.validate().is_err());
        config.glcm_offset = 4;
        assert!(config.validate().is_err());
        config.glcm_offset = 3;
        assert!(config.validate().is_ok());

        // Memory TTL longer than disk TTL
        config.cache.memory_ttl_secs = 3600;
        assert!(config.validate().is_err());
        config.cache.memory_ttl_secs = 300;

        config.cache.disk_ttl_secs = 0;
        assert!(config.validate().is_err());
        config.cache.disk_ttl_secs = 1800;

        config.cache.max_memory_mb = 0;
        assert!(config.validate().is_err());
        config.cache.max_memory_mb = 100;

        config.cache.cleanup_interval_secs = 0;
        assert!(config.validate().is_err());
        config.cache.cleanup_interval_secs = 600;

        config.advanced_max_dimension = 0;
        assert!(config.validate().is_err());
        config.advanced_max_dimension = 1024;

        // Valid again
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_workers() {
        let mut config = ExtractorConfig::default();
        assert!(config.effective_workers() >= 1);
        config.workers = 4;
        assert_eq!(config.effective_workers(), 4);
    }

    #[test]
    fn test_partial_json() {
        let config: ExtractorConfig = serde_json::from_str(
            r#"{ "key_scheme": "content", "cache": { "directory": "/var/cache/bfx" } }"#,
        )
        .unwrap();
        assert_eq!(config.key_scheme, KeyScheme::Content);
        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/bfx"));
        assert_eq!(config.cache.memory_ttl_secs, 300);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bfx.json");
        std::fs::write(&path, r#"{ "glcm_offset": 7 }"#).unwrap();
        let err = ExtractorConfig::from_file(&path).unwrap_err();
        assert_eq!(err.category(), "config");

        std::fs::write(&path, r#"{ "glcm_offset": 2 }"#).unwrap();
        assert_eq!(ExtractorConfig::from_file(&path).unwrap().glcm_offset, 2);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(
            parse_duration("5124095576030431h").unwrap(),
            Duration::from_secs(5_124_095_576_030_431 * 3600)
        );
        assert!(parse_duration("9999999999999999h").is_err());
        assert!(parse_duration("307445734561825861m").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("xm").is_err());
    }
}
