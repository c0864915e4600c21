//! # Ballistic Features
//!
//! Parallel, cached extraction of texture and shape descriptors from cartridge-case and
//! bullet images.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `core`: partitioning, the worker pool and the region feature merger
//! - `cache`: two-tier (memory + disk) feature cache with TTL expiry and LRU eviction
//! - `processing`: the [`OptimizedFeatureExtractor`] orchestrator and the advanced-feature
//!   collaborator seam
//! - `config`: configuration management and validation
//! - `logging`: subscriber setup for binaries
//!
//! Per-region statistics (GLCM texture, contour shape) live in the `region-sample` crate.
//!
//! ## Data Flow
//!
//! ```text
//! image + identity ─▶ cache key ─▶ FeatureCache ──hit──────────────────────────▶ output
//!                                      │ miss
//!                                      ▼
//!                     partition ─▶ WorkerPool (N threads) ─▶ RegionFeatureMerger
//!                                                                  │
//!                                      advanced collaborator ◀─────┘ (optional)
//!                                                │
//!                                      FeatureCache::set ─────────────────────▶ output
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use ballistic_features::{ExtractorConfig, OptimizedFeatureExtractor};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = OptimizedFeatureExtractor::new(ExtractorConfig::default())?;
//!
//! let output = extractor.extract_path(Path::new("uploads/case_17.png"))?;
//! println!("circularity = {}", output.local.circularity);
//!
//! extractor.cleanup()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod processing;

/// Re-export error types for convenience
pub use error::{
    ExtractError, ExtractResult, HasRecoverySuggestion, HasSeverity, Recoverable, Retryable,
};

pub use cache::{CacheKey, CacheStats, FeatureCache};
pub use config::{CacheConfig, ExtractorConfig, KeyScheme};
pub use crate::core::features::{AdvancedFeatures, ExtractionOutput, FeatureMap, LocalFeatures};
pub use processing::{AdvancedFeatureExtractor, ExtractorStats, OptimizedFeatureExtractor};
