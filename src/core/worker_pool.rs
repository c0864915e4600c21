//! # Worker Pool
//!
//! A fixed set of long-lived OS threads computing region features.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  FeatureJob   ┌────────────────┐   FeatureResult   ┌──────────────┐
//! │ Orchestrator │──────────────▶│  bounded job   │──▶ worker 0..N ──▶│ batch reply  │
//! │  (producer)  │               │     queue      │                   │   channel    │
//! └──────────────┘               └────────────────┘                   └──────┬───────┘
//!        ▲                                                                   │
//!        └──────────────────── collect by job id ────────────────────────────┘
//! ```
//!
//! Every job carries the sender half of its batch's reply channel, so concurrent batches
//! from different callers never see each other's results. The job and reply queues are
//! the only synchronization between the producer and the workers.
//!
//! ## Failure Isolation
//!
//! A sampler error or a panic inside one job is reported through that job's
//! [`FeatureResult`]; the worker then carries on with the next job.
//!
//! ## Lifecycle
//!
//! [`WorkerPool::cleanup`] closes the job queue and joins every worker once in-flight work
//! has drained. Dropping a pool that was never cleaned up is logged as a leak and the
//! shutdown is performed on the spot.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use region_sample::{PixelSource, Region, RegionFeatures, RegionSampler};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ExtractError, ExtractResult};

/// Minimum job queue capacity; enough for one extraction at any sane worker count.
pub const MIN_QUEUE_CAPACITY: usize = 100;

/// One region of one image, handed to exactly one worker.
pub struct FeatureJob {
    pub job_id: usize,
    pub region: Region,
    pub source: Arc<dyn PixelSource>,
    reply: Sender<FeatureResult>,
}

impl FeatureJob {
    /// Creates a job whose result is delivered on `reply`.
    pub fn new(
        job_id: usize,
        region: Region,
        source: Arc<dyn PixelSource>,
        reply: Sender<FeatureResult>,
    ) -> Self {
        Self {
            job_id,
            region,
            source,
            reply,
        }
    }
}

impl std::fmt::Debug for FeatureJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureJob")
            .field("job_id", &self.job_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Outcome of one [`FeatureJob`].
#[derive(Debug)]
pub struct FeatureResult {
    pub job_id: usize,
    pub outcome: ExtractResult<RegionFeatures>,
}

/// Counters observed across the pool's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Fixed-size pool of region workers.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ballistic_features::core::worker_pool::WorkerPool;
/// use image::{Rgb, RgbImage};
/// use region_sample::{PixelSource, RegionSampler, SamplerParams};
///
/// let sampler = Arc::new(RegionSampler::new(SamplerParams::default()));
/// let pool = WorkerPool::new(2, sampler).unwrap();
///
/// let image: Arc<dyn PixelSource> = Arc::new(RgbImage::from_pixel(16, 16, Rgb([9, 9, 9])));
/// let regions = image.bounds().split_rows(2);
/// let features = pool.run_batch(image, &regions).unwrap();
/// assert_eq!(features.len(), 2);
///
/// pool.cleanup().unwrap();
/// ```
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    sampler: Arc<RegionSampler>,
    jobs: Mutex<Option<Sender<FeatureJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawns exactly `size` workers sharing `sampler`.
    pub fn new(size: usize, sampler: Arc<RegionSampler>) -> ExtractResult<Self> {
        if size == 0 {
            return Err(ExtractError::config(
                "workers",
                "0",
                "worker pool needs at least one worker",
            ));
        }

        let capacity = MIN_QUEUE_CAPACITY.max(size * 4);
        let (tx, rx) = bounded::<FeatureJob>(capacity);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let rx = rx.clone();
            let sampler = Arc::clone(&sampler);
            let counters = Arc::clone(&counters);
            let spawned = thread::Builder::new()
                .name(format!("bfx-worker-{index}"))
                .spawn(move || worker_loop(rx, sampler, counters));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Release the workers that did start before reporting.
                    drop(tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(ExtractError::io("spawn worker thread", e));
                }
            }
        }

        debug!(workers = size, capacity, "worker pool started");

        Ok(Self {
            size,
            sampler,
            jobs: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            counters,
        })
    }

    /// Number of workers, which is also the number of regions per image.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sampler(&self) -> &Arc<RegionSampler> {
        &self.sampler
    }

    pub fn is_running(&self) -> bool {
        self.jobs.lock().is_some()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.size,
            jobs_completed: self.counters.completed.load(Ordering::Relaxed),
            jobs_failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Queues one job. Blocks only while the job queue is full.
    pub fn submit(&self, job: FeatureJob) -> ExtractResult<()> {
        let sender = self.jobs.lock().clone().ok_or_else(|| {
            ExtractError::state("shut down", "submit job", "worker pool was cleaned up")
        })?;
        let job_id = job.job_id;
        sender
            .send(job)
            .map_err(|_| ExtractError::submission(job_id, "job queue disconnected"))
    }

    /// Samples every region of `source` and returns the results in region order.
    ///
    /// Exactly one result is collected per submitted job. The first failed job aborts the
    /// batch; results still in flight are discarded by the workers.
    pub fn run_batch(
        &self,
        source: Arc<dyn PixelSource>,
        regions: &[Region],
    ) -> ExtractResult<Vec<RegionFeatures>> {
        let expected = regions.len();
        let (reply_tx, reply_rx) = bounded::<FeatureResult>(expected.max(1));

        for (job_id, region) in regions.iter().enumerate() {
            let job = FeatureJob::new(job_id, *region, Arc::clone(&source), reply_tx.clone());
            self.submit(job)?;
        }
        drop(reply_tx);

        let mut slots: Vec<Option<RegionFeatures>> = vec![None; expected];
        for received in 0..expected {
            let result = reply_rx.recv().map_err(|_| {
                ExtractError::collection(expected, received, "workers dropped pending jobs")
            })?;
            let slot = slots.get_mut(result.job_id).ok_or_else(|| {
                ExtractError::collection(expected, received, "result for unknown job id")
            })?;
            *slot = Some(result.outcome?);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(job_id, slot)| {
                slot.ok_or_else(|| {
                    ExtractError::collection(expected, expected, "duplicate result")
                        .with_metadata("missing_job", job_id.to_string())
                })
            })
            .collect()
    }

    /// Closes the job queue and joins every worker after in-flight jobs finish.
    ///
    /// Idempotent.
    pub fn cleanup(&self) -> ExtractResult<()> {
        let Some(sender) = self.jobs.lock().take() else {
            return Ok(());
        };
        drop(sender);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let mut panicked = 0usize;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        debug!(workers = self.size, "worker pool stopped");
        if panicked > 0 {
            return Err(ExtractError::state(
                "shutting down",
                "join workers",
                format!("{panicked} worker thread(s) panicked"),
            ));
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                workers = self.size,
                "worker pool dropped without cleanup; shutting down"
            );
            let _ = self.cleanup();
        }
    }
}

fn worker_loop(jobs: Receiver<FeatureJob>, sampler: Arc<RegionSampler>, counters: Arc<Counters>) {
    for job in jobs.iter() {
        let FeatureJob {
            job_id,
            region,
            source,
            reply,
        } = job;

        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            sampler.sample(source.as_ref(), region)
        })) {
            Ok(Ok(features)) => Ok(features),
            Ok(Err(e)) => Err(ExtractError::region(job_id, e.to_string())),
            Err(payload) => Err(ExtractError::region(
                job_id,
                format!("region computation panicked: {}", panic_message(&*payload)),
            )),
        };

        if outcome.is_ok() {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }

        // The collector may have given up on this batch already.
        let _ = reply.send(FeatureResult { job_id, outcome });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use region_sample::SamplerParams;

    /// Panics on any read from the rows at or below `poison_row`.
    struct PoisonedRows {
        inner: RgbImage,
        poison_row: u32,
    }

    impl PixelSource for PoisonedRows {
        fn bounds(&self) -> Region {
            self.inner.bounds()
        }

        fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
            if y >= self.poison_row {
                panic!("poisoned row {y}");
            }
            self.inner.get_pixel(x, y).0
        }
    }

    fn pool(size: usize) -> WorkerPool {
        WorkerPool::new(size, Arc::new(RegionSampler::new(SamplerParams::default()))).unwrap()
    }

    #[test]
    fn test_zero_workers_rejected() {
        let sampler = Arc::new(RegionSampler::new(SamplerParams::default()));
        assert!(WorkerPool::new(0, sampler).is_err());
    }

    #[test]
    fn test_one_result_per_job_in_region_order() {
        let pool = pool(3);
        let mut img = RgbImage::from_pixel(20, 30, Rgb([255, 255, 255]));
        // Dark block only in the bottom third.
        for y in 22..28 {
            for x in 5..15 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let source: Arc<dyn PixelSource> = Arc::new(img);
        let regions = source.bounds().split_rows(3);

        let features = pool.run_batch(Arc::clone(&source), &regions).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].shape.circularity, 0.0);
        assert_eq!(features[1].shape.circularity, 0.0);
        assert!(features[2].shape.circularity > 0.0);
        assert_eq!(pool.sampler().calls(), 3);
        assert_eq!(pool.stats().jobs_completed, 3);

        pool.cleanup().unwrap();
    }

    #[test]
    fn test_panic_is_reported_and_pool_survives() {
        let pool = pool(2);
        let poisoned: Arc<dyn PixelSource> = Arc::new(PoisonedRows {
            inner: RgbImage::from_pixel(8, 8, Rgb([50, 50, 50])),
            poison_row: 4,
        });
        let regions = poisoned.bounds().split_rows(2);

        let err = pool.run_batch(poisoned, &regions).unwrap_err();
        assert_eq!(err.category(), "region");
        assert!(err.to_string().contains("panicked"));

        // Both workers are still alive and serving.
        let healthy: Arc<dyn PixelSource> = Arc::new(RgbImage::from_pixel(8, 8, Rgb([1, 1, 1])));
        for _ in 0..4 {
            let regions = healthy.bounds().split_rows(2);
            assert_eq!(pool.run_batch(Arc::clone(&healthy), &regions).unwrap().len(), 2);
        }
        assert!(pool.stats().jobs_failed >= 1);

        pool.cleanup().unwrap();
    }

    #[test]
    fn test_sampler_error_is_reported() {
        let pool = pool(1);
        let source: Arc<dyn PixelSource> = Arc::new(RgbImage::new(4, 4));
        let outside = [Region::new(0, 0, 4, 9)];
        let err = pool.run_batch(source, &outside).unwrap_err();
        assert_eq!(err.category(), "region");
        pool.cleanup().unwrap();
    }

    #[test]
    fn test_concurrent_batches_do_not_mix() {
        let pool = Arc::new(pool(4));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let shade = if i % 2 == 0 { 0 } else { 255 };
                    let source: Arc<dyn PixelSource> =
                        Arc::new(RgbImage::from_pixel(12, 40, Rgb([shade, shade, shade])));
                    let regions = source.bounds().split_rows(4);
                    let features = pool.run_batch(source, &regions).unwrap();
                    (i, features)
                })
            })
            .collect();

        for handle in handles {
            let (i, features) = handle.join().unwrap();
            assert_eq!(features.len(), 4);
            for f in features {
                // A fully foreground slice has no contour; a background slice has no area.
                // Either way texture is uniform.
                assert_eq!(f.glcm.contrast, 0.0, "batch {i}");
                assert_eq!(f.glcm.energy, 1.0, "batch {i}");
            }
        }
        pool.cleanup().unwrap();
    }

    #[test]
    fn test_submit_after_cleanup_fails() {
        let pool = pool(2);
        pool.cleanup().unwrap();
        assert!(!pool.is_running());
        // Second cleanup is a no-op.
        pool.cleanup().unwrap();

        let source: Arc<dyn PixelSource> = Arc::new(RgbImage::new(2, 2));
        let regions = [source.bounds()];
        let err = pool.run_batch(source, &regions).unwrap_err();
        assert_eq!(err.category(), "state");
    }

    #[test]
    fn test_drop_without_cleanup_joins_workers() {
        let pool = pool(2);
        let source: Arc<dyn PixelSource> = Arc::new(RgbImage::new(2, 2));
        let regions = [source.bounds()];
        pool.run_batch(source, &regions).unwrap();
        drop(pool);
    }
}
