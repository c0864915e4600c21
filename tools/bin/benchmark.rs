/// Benchmark comparing cold extraction against cache hits
///
/// Time complexity: O(width * height * rounds) for the cold runs, each of which
/// resamples every pixel. Cached rounds are O(1) in image size apart from key
/// construction.
///
/// Runs against a synthetic 1600x1200 disc image with a throwaway cache directory so
/// nothing on disk is reused between invocations.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use ballistic_features::{ExtractorConfig, OptimizedFeatureExtractor};
use image::{DynamicImage, Rgb, RgbImage};

const WIDTH: u32 = 1600;
const HEIGHT: u32 = 1200;
const ROUNDS: u32 = 10;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    println!("Feature Extraction Benchmark");
    println!("═══════════════════════════════════");
    println!("Image: {}x{} disc, {} rounds", WIDTH, HEIGHT, ROUNDS);
    println!();

    let image = Arc::new(disc_image(WIDTH, HEIGHT));
    let scratch = tempfile::tempdir()?;

    println!("Scaling (cold, cache disabled):");
    println!("───────────────────────────────");
    let mut single = None;
    for workers in [1usize, 2, 4, 8] {
        let mut config = config_in(scratch.path(), workers);
        config.cache.enabled = false;
        let extractor = OptimizedFeatureExtractor::new(config)?;

        let elapsed = time_rounds(&extractor, &image, |round| {
            PathBuf::from(format!("cold_{round}.png"))
        })?;
        let baseline = *single.get_or_insert(elapsed);
        println!(
            "{:>2} workers: {:>8.2} ms per image  ({:.2}x)",
            workers,
            per_round_ms(elapsed),
            baseline.as_secs_f64() / elapsed.as_secs_f64()
        );
        extractor.cleanup()?;
    }

    println!();
    println!("Cache:");
    println!("───────────");
    let extractor = OptimizedFeatureExtractor::new(config_in(scratch.path(), 0))?;
    let identity = Path::new("bench_disc.png");

    let started = Instant::now();
    extractor.extract(Arc::clone(&image), identity)?;
    let cold = started.elapsed();

    let warm = time_rounds(&extractor, &image, |_| identity.to_path_buf())?;
    let stats = extractor.stats();

    println!("Cold extraction:  {:>10.3} ms", cold.as_secs_f64() * 1000.0);
    println!("Cached lookup:    {:>10.3} ms", per_round_ms(warm));
    println!(
        "Speedup:          {:>10.1}x",
        cold.as_secs_f64() / (warm.as_secs_f64() / ROUNDS as f64)
    );
    println!(
        "Served from cache: {}/{}  (memory {:.2} MB)",
        stats.served_from_cache,
        stats.extractions,
        stats.cache.memory_usage_mb()
    );

    extractor.cleanup()?;
    Ok(())
}

fn config_in(dir: &Path, workers: usize) -> ExtractorConfig {
    let mut config = ExtractorConfig::default();
    config.workers = workers;
    config.cache.directory = dir.join("cache");
    config.temp_dir = dir.join("tmp");
    config
}

fn time_rounds(
    extractor: &OptimizedFeatureExtractor,
    image: &Arc<DynamicImage>,
    identity: impl Fn(u32) -> PathBuf,
) -> Result<Duration> {
    let started = Instant::now();
    for round in 0..ROUNDS {
        extractor.extract(Arc::clone(image), &identity(round))?;
    }
    Ok(started.elapsed())
}

fn per_round_ms(total: Duration) -> f64 {
    total.as_secs_f64() * 1000.0 / ROUNDS as f64
}

/// Dark disc on a light background with mild horizontal striping for texture.
fn disc_image(width: u32, height: u32) -> DynamicImage {
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = width.min(height) as f64 / 4.0;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        let base: u8 = if dx * dx + dy * dy <= radius * radius { 40 } else { 220 };
        let value = base.saturating_sub(((x / 3) % 4) as u8 * 5);
        Rgb([value, value, value])
    }))
}
