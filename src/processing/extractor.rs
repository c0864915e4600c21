//! # Optimized Feature Extractor
//!
//! The public entry point of the pipeline.
//!
//! ```text
//! extract(image, identity)
//!   │
//!   ├─▶ key = basename_WxH_o{offset}_t{threshold}[_digest]
//!   ├─▶ cache.get(key) ──hit──▶ return
//!   │
//!   ├─▶ partition into pool.size() row slices
//!   ├─▶ pool.run_batch ─▶ one RegionFeatures per slice      (fatal on error)
//!   ├─▶ merger.merge   ─▶ LocalFeatures                     (fatal on error)
//!   ├─▶ advanced collaborator, if any                       (best effort)
//!   ├─▶ cache.set(key, output)
//!   └─▶ return output
//! ```
//!
//! Each extractor owns its pool and its cache; call [`cleanup`](OptimizedFeatureExtractor::cleanup)
//! before dropping it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use region_sample::{PixelSource, Region, RegionSampler};
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{pixel_digest, CacheKey, CacheStats, Clock, FeatureCache, SystemClock};
use crate::config::{ExtractorConfig, KeyScheme};
use crate::core::features::{
    region_feature_map, AdvancedFeatures, ExtractionOutput, FeatureMap, LocalFeatures,
};
use crate::core::merger::RegionFeatureMerger;
use crate::core::partition::partition;
use crate::core::worker_pool::{PoolStats, WorkerPool};
use crate::error::{ExtractError, ExtractResult};
use crate::processing::advanced::{AdvancedFeatureExtractor, AdvancedPreparer};

/// Activity of one extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExtractorStats {
    pub extractions: u64,
    pub served_from_cache: u64,
    pub computed: u64,
    /// Regions handed to the sampler, including failed ones.
    pub regions_sampled: u64,
    pub pool: PoolStats,
    pub cache: CacheStats,
}

#[derive(Debug, Default)]
struct Counters {
    extractions: AtomicU64,
    served_from_cache: AtomicU64,
    computed: AtomicU64,
}

/// Cached, parallel feature extraction.
///
/// # Examples
///
/// ```rust
/// use std::path::Path;
/// use std::sync::Arc;
/// use ballistic_features::{ExtractorConfig, OptimizedFeatureExtractor};
/// use image::{DynamicImage, Rgb, RgbImage};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut config = ExtractorConfig::default();
/// config.workers = 2;
/// config.cache.directory = dir.path().join("cache");
///
/// let extractor = OptimizedFeatureExtractor::new(config).unwrap();
/// let image = Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([220, 220, 220]))));
///
/// let output = extractor.extract(image, Path::new("blank.png")).unwrap();
/// assert_eq!(output.local.image_area, 1200.0);
/// assert!(output.advanced.is_empty());
///
/// extractor.cleanup().unwrap();
/// ```
pub struct OptimizedFeatureExtractor {
    config: ExtractorConfig,
    pool: WorkerPool,
    merger: RegionFeatureMerger,
    cache: FeatureCache,
    advanced: Option<Arc<dyn AdvancedFeatureExtractor>>,
    preparer: AdvancedPreparer,
    counters: Counters,
}

impl std::fmt::Debug for OptimizedFeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizedFeatureExtractor")
            .field("workers", &self.pool.size())
            .field("cache_enabled", &self.cache.is_enabled())
            .field("advanced", &self.advanced.is_some())
            .finish_non_exhaustive()
    }
}

impl OptimizedFeatureExtractor {
    /// Validates `config`, starts the worker pool and opens the cache.
    pub fn new(config: ExtractorConfig) -> ExtractResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// As [`new`](Self::new), with the cache reading time from `clock`.
    pub fn with_clock(config: ExtractorConfig, clock: Arc<dyn Clock>) -> ExtractResult<Self> {
        config.validate()?;

        let sampler = Arc::new(RegionSampler::new(config.sampler_params()));
        let pool = WorkerPool::new(config.effective_workers(), sampler)?;
        let cache = match FeatureCache::with_clock(&config.cache, clock) {
            Ok(cache) => cache,
            Err(e) => {
                pool.cleanup()?;
                return Err(e);
            }
        };
        let preparer = AdvancedPreparer::new(&config.temp_dir, config.advanced_max_dimension);

        debug!(
            workers = pool.size(),
            cache_enabled = cache.is_enabled(),
            "feature extractor ready"
        );

        Ok(Self {
            config,
            pool,
            merger: RegionFeatureMerger::new(),
            cache,
            advanced: None,
            preparer,
            counters: Counters::default(),
        })
    }

    /// Attaches an advanced-feature collaborator.
    pub fn with_advanced(mut self, collaborator: Arc<dyn AdvancedFeatureExtractor>) -> Self {
        self.advanced = Some(collaborator);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Key under which `image` known as `identity` is cached.
    ///
    /// The sampler parameters are always part of the key so a persisted disk tier is
    /// never reused across different settings.
    pub fn cache_key(&self, image: &DynamicImage, identity: &Path) -> CacheKey {
        let key = CacheKey::for_image(identity, image.width(), image.height())
            .with_part(format_args!("o{}", self.config.glcm_offset))
            .with_part(format_args!("t{}", self.config.foreground_threshold));
        match self.config.key_scheme {
            KeyScheme::Name => key,
            KeyScheme::Content => key.with_part(pixel_digest(image.as_bytes())),
        }
    }

    /// Extracts local and advanced features for `image`, identified by `identity`.
    ///
    /// A cache hit returns without touching the worker pool. On a miss every region must
    /// succeed; the advanced collaborator may fail without failing the call.
    pub fn extract(
        &self,
        image: Arc<DynamicImage>,
        identity: &Path,
    ) -> ExtractResult<ExtractionOutput> {
        let started = Instant::now();
        self.counters.extractions.fetch_add(1, Ordering::Relaxed);

        let key = self.cache_key(&image, identity);
        if let Some(cached) = self.cache.get(&key) {
            self.counters.served_from_cache.fetch_add(1, Ordering::Relaxed);
            info!(
                identity = %identity.display(),
                key = %key,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "features served from cache"
            );
            return Ok(cached);
        }

        let (width, height) = (image.width(), image.height());
        let local = self.compute_local(Arc::clone(&image), width, height)?;

        let advanced = match &self.advanced {
            Some(collaborator) => self.preparer.run(collaborator.as_ref(), &image),
            None => AdvancedFeatures::new(),
        };

        let output = ExtractionOutput::new(local, advanced);
        self.cache.set(key.clone(), output.clone());
        self.counters.computed.fetch_add(1, Ordering::Relaxed);

        info!(
            identity = %identity.display(),
            key = %key,
            width,
            height,
            regions = self.pool.size(),
            advanced_features = output.advanced.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "features extracted"
        );
        Ok(output)
    }

    /// Partition, sample and merge.
    fn compute_local(
        &self,
        image: Arc<DynamicImage>,
        width: u32,
        height: u32,
    ) -> ExtractResult<LocalFeatures> {
        let regions = partition(width, height, self.pool.size())?;
        let source: Arc<dyn PixelSource> = image;
        let per_region = self.pool.run_batch(source, &regions)?;
        let maps: Vec<FeatureMap> = per_region.iter().map(region_feature_map).collect();
        self.merger.merge(&maps, Region::from_size(width, height))
    }

    /// Decodes the file at `path` and extracts it under that identity.
    pub fn extract_path(&self, path: &Path) -> ExtractResult<ExtractionOutput> {
        let image = image::open(path).map_err(|e| {
            ExtractError::from(e)
                .with_operation("decode image")
                .with_context(path.display().to_string())
        })?;
        self.extract(Arc::new(image), path)
    }

    /// Runs [`extract`](Self::extract) on the blocking pool and gives up after `timeout`.
    ///
    /// Giving up abandons the call; workers already sampling regions run to completion.
    pub async fn extract_with_timeout(
        self: &Arc<Self>,
        image: Arc<DynamicImage>,
        identity: PathBuf,
        timeout: Duration,
    ) -> ExtractResult<ExtractionOutput> {
        let extractor = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || extractor.extract(image, &identity));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExtractError::external("tokio", join_error)
                .with_operation("extract on blocking pool")),
            Err(_) => Err(ExtractError::timeout("extract", timeout.as_millis() as u64)),
        }
    }

    pub fn stats(&self) -> ExtractorStats {
        ExtractorStats {
            extractions: self.counters.extractions.load(Ordering::Relaxed),
            served_from_cache: self.counters.served_from_cache.load(Ordering::Relaxed),
            computed: self.counters.computed.load(Ordering::Relaxed),
            regions_sampled: self.pool.sampler().calls(),
            pool: self.pool.stats(),
            cache: self.cache.stats(),
        }
    }

    /// Stops the workers, the cache sweeper and pending disk writes. Idempotent.
    pub fn cleanup(&self) -> ExtractResult<()> {
        let pool = self.pool.cleanup();
        self.cache.cleanup();
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::core::features::LOCAL_VOCABULARY;
    use image::{Rgb, RgbImage};

    fn config(dir: &Path, workers: usize) -> ExtractorConfig {
        let mut config = ExtractorConfig::default();
        config.workers = workers;
        config.cache.directory = dir.join("cache");
        config.temp_dir = dir.join("tmp");
        config
    }

    fn blank(width: u32, height: u32) -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([220, 220, 220]),
        )))
    }

    #[test]
    fn test_key_folds_sampler_params() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = OptimizedFeatureExtractor::new(config(dir.path(), 1)).unwrap();
        let key = extractor.cache_key(&blank(8, 4), Path::new("/a/b/x.png"));
        assert_eq!(key.as_str(), "x.png_8x4_o1_t128");
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_content_key_distinguishes_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1);
        cfg.key_scheme = KeyScheme::Content;
        let extractor = OptimizedFeatureExtractor::new(cfg).unwrap();

        let dark = Arc::new(DynamicImage::ImageRgb8(RgbImage::new(8, 4)));
        let a = extractor.cache_key(&blank(8, 4), Path::new("x.png"));
        let b = extractor.cache_key(&dark, Path::new("x.png"));
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("x.png_8x4_o1_t128_"));
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = OptimizedFeatureExtractor::new(config(dir.path(), 3)).unwrap();
        let image = blank(30, 20);

        let first = extractor.extract(Arc::clone(&image), Path::new("x.png")).unwrap();
        let sampled = extractor.stats().regions_sampled;
        assert_eq!(sampled, 3);

        let second = extractor.extract(image, Path::new("x.png")).unwrap();
        assert_eq!(first, second);

        let stats = extractor.stats();
        assert_eq!(stats.regions_sampled, sampled);
        assert_eq!(stats.served_from_cache, 1);
        assert_eq!(stats.computed, 1);
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_expired_memory_recomputes_only_when_disk_also_expired() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let extractor =
            OptimizedFeatureExtractor::with_clock(config(dir.path(), 2), clock.clone()).unwrap();
        let image = blank(10, 10);

        extractor.extract(Arc::clone(&image), Path::new("x.png")).unwrap();
        extractor.cache().flush();

        clock.advance(Duration::from_secs(400));
        extractor.extract(Arc::clone(&image), Path::new("x.png")).unwrap();
        assert_eq!(extractor.stats().regions_sampled, 2);
        assert_eq!(extractor.stats().cache.disk_hits, 1);

        clock.advance(Duration::from_secs(4000));
        extractor.extract(image, Path::new("x.png")).unwrap();
        assert_eq!(extractor.stats().regions_sampled, 4);
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_local_map_has_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = OptimizedFeatureExtractor::new(config(dir.path(), 4)).unwrap();
        let output = extractor.extract(blank(16, 9), Path::new("x.png")).unwrap();

        let map = output.local.to_map();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        let mut expected = LOCAL_VOCABULARY.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert!(output.local.is_finite());
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_advanced_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let failing = |_: &Path| -> anyhow::Result<AdvancedFeatures> {
            anyhow::bail!("bridge unavailable")
        };
        let extractor = OptimizedFeatureExtractor::new(config(dir.path(), 2))
            .unwrap()
            .with_advanced(Arc::new(failing));

        let output = extractor.extract(blank(12, 12), Path::new("x.png")).unwrap();
        assert!(output.advanced.is_empty());
        assert_eq!(output.local.image_area, 144.0);
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_empty_image_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = OptimizedFeatureExtractor::new(config(dir.path(), 2)).unwrap();
        let err = extractor
            .extract(blank(0, 0), Path::new("empty.png"))
            .unwrap_err();
        assert_eq!(err.category(), "partition");
        assert_eq!(extractor.stats().computed, 0);
        extractor.cleanup().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 2);
        cfg.glcm_offset = 9;
        assert!(OptimizedFeatureExtractor::new(cfg).is_err());
    }

    #[tokio::test]
    async fn test_extract_with_timeout_completes() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(OptimizedFeatureExtractor::new(config(dir.path(), 2)).unwrap());
        let output = extractor
            .extract_with_timeout(blank(20, 20), PathBuf::from("x.png"), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(output.local.image_width, 20.0);
        extractor.cleanup().unwrap();
    }

    #[tokio::test]
    async fn test_extract_with_timeout_expires() {
        let dir = tempfile::tempdir().unwrap();
        let slow = |_: &Path| -> anyhow::Result<AdvancedFeatures> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(AdvancedFeatures::new())
        };
        let extractor = Arc::new(
            OptimizedFeatureExtractor::new(config(dir.path(), 1))
                .unwrap()
                .with_advanced(Arc::new(slow)),
        );

        let err = extractor
            .extract_with_timeout(blank(8, 8), PathBuf::from("x.png"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "timeout");

        // The abandoned call still finishes and populates the cache.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(extractor.stats().computed, 1);
        extractor.cleanup().unwrap();
    }
}
