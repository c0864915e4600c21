//! Common test utilities and helpers for the extraction pipeline tests
//!
//! Synthetic images with known geometry and throwaway configurations rooted in a
//! temporary directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use ballistic_features::ExtractorConfig;
use image::{DynamicImage, Rgb, RgbImage};

pub const DARK: u8 = 40;
pub const LIGHT: u8 = 220;

/// Synthetic test images
pub mod test_images {
    use super::*;

    /// Dark filled disc centred in a light field.
    pub fn disc(width: u32, height: u32, radius: u32) -> Arc<DynamicImage> {
        let (cx, cy) = (width as i64 / 2, height as i64 / 2);
        let r2 = (radius as i64).pow(2);
        paint(width, height, |x, y| {
            let (dx, dy) = (x as i64 - cx, y as i64 - cy);
            dx * dx + dy * dy <= r2
        })
    }

    /// Dark horizontal bar covering `rows` by `cols` in a light field.
    pub fn bar(
        width: u32,
        height: u32,
        rows: std::ops::Range<u32>,
        cols: std::ops::Range<u32>,
    ) -> Arc<DynamicImage> {
        paint(width, height, |x, y| rows.contains(&y) && cols.contains(&x))
    }

    pub fn solid(width: u32, height: u32, value: u8) -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([value, value, value]),
        )))
    }

    /// Single-pixel checkerboard; every horizontal neighbour differs.
    pub fn checkerboard(width: u32, height: u32) -> Arc<DynamicImage> {
        paint(width, height, |x, y| (x + y) % 2 == 0)
    }

    fn paint(width: u32, height: u32, dark: impl Fn(u32, u32) -> bool) -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = if dark(x, y) { DARK } else { LIGHT };
            Rgb([v, v, v])
        })))
    }
}

/// Extractor configuration with cache and temp files under `dir`.
pub fn config_in(dir: &Path, workers: usize) -> ExtractorConfig {
    let mut config = ExtractorConfig::default();
    config.workers = workers;
    config.cache.directory = dir.join("cache");
    config.temp_dir = dir.join("tmp");
    config
}
