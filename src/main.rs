use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ballistic_features::config::parse_duration;
use ballistic_features::logging::init_logging;
use ballistic_features::{ExtractionOutput, ExtractorConfig, FeatureCache, OptimizedFeatureExtractor};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

/// Parallel texture and shape feature extraction with a two-tier cache.
#[derive(Parser, Debug)]
#[command(name = "bfx")]
#[command(about = "🔬 Extract ballistic image features with parallel workers and caching")]
#[command(long_about = "Extract GLCM texture and contour shape features from ballistic images.
Images are split into one horizontal slice per worker, sampled in parallel, and the merged
result is cached in memory and on disk keyed by file name and dimensions.")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true, help = "Path to a JSON configuration file")]
    config: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long, global = true,
          help = "Worker threads and regions per image (0 = one per logical CPU)")]
    workers: Option<usize>,

    /// Foreground luminance threshold
    #[arg(short, long, global = true,
          help = "Pixels darker than this luminance (0-255) are foreground")]
    threshold: Option<u8>,

    /// GLCM pixel offset
    #[arg(short, long, global = true, help = "Horizontal GLCM pixel offset (1-3)")]
    offset: Option<u32>,

    /// Cache directory
    #[arg(long, global = true, help = "Directory for the disk cache tier")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract features and print them as JSON
    Extract {
        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Per-image deadline (supports seconds, minutes, hours)
        #[arg(long, default_value = "5m",
              help = "Give up on an image after: 30s (30 seconds), 2m (2 minutes), 1h (1 hour)")]
        timeout: String,
    },
    /// Print disk cache statistics as JSON
    Stats,
    /// Delete every cached entry
    Clear,
}

#[derive(Serialize)]
struct ImageReport {
    image: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<ExtractionOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _logging = init_logging(&config.logging).context("initialise logging")?;

    match args.command {
        Command::Extract { images, timeout } => {
            let timeout = parse_duration(&timeout)?;
            extract(config, images, timeout).await
        }
        Command::Stats => {
            let cache = FeatureCache::new(&config.cache)?;
            println!("{}", serde_json::to_string_pretty(&cache.stats())?);
            cache.cleanup();
            Ok(())
        }
        Command::Clear => {
            let cache = FeatureCache::new(&config.cache)?;
            cache.clear()?;
            cache.cleanup();
            info!(directory = %config.cache.directory.display(), "cache cleared");
            Ok(())
        }
    }
}

/// File configuration (or defaults) with command-line overrides applied.
fn load_config(args: &Args) -> Result<ExtractorConfig> {
    let mut config = match &args.config {
        Some(path) => ExtractorConfig::from_file(path)?,
        None => ExtractorConfig::default(),
    };

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(threshold) = args.threshold {
        config.foreground_threshold = threshold;
    }
    if let Some(offset) = args.offset {
        config.glcm_offset = offset;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.directory = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn extract(
    config: ExtractorConfig,
    images: Vec<PathBuf>,
    timeout: std::time::Duration,
) -> Result<()> {
    let extractor = Arc::new(OptimizedFeatureExtractor::new(config)?);
    let mut reports = Vec::with_capacity(images.len());
    let mut failures = 0usize;

    for path in images {
        let outcome = match image::open(&path) {
            Ok(decoded) => extractor
                .extract_with_timeout(Arc::new(decoded), path.clone(), timeout)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e).context("decode image")),
        };

        match outcome {
            Ok(features) => reports.push(ImageReport {
                image: path,
                features: Some(features),
                error: None,
            }),
            Err(e) => {
                failures += 1;
                error!(image = %path.display(), error = %format!("{e:#}"), "extraction failed");
                reports.push(ImageReport {
                    image: path,
                    features: None,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    info!(stats = ?extractor.stats(), "run complete");
    extractor.cleanup()?;

    if failures > 0 {
        anyhow::bail!("{failures} image(s) failed");
    }
    Ok(())
}
