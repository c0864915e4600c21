//! # Advanced Feature Collaborator
//!
//! Secondary descriptors (Hu moments, firing-pin marks, striation patterns, ...) come
//! from an external component that reads an image file. This module owns the seam:
//!
//! 1. Downscale the image so neither side exceeds the configured maximum (Lanczos3,
//!    aspect preserved).
//! 2. Encode it as PNG into a uniquely named temporary file inside the temp directory.
//! 3. Hand the path to the collaborator.
//! 4. Remove the file, whether the collaborator succeeded, failed or panicked.
//!
//! A collaborator failure never fails an extraction; it yields an empty map.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::features::{finite_or_zero, AdvancedFeatures};
use crate::error::{ExtractError, ExtractResult};

/// An external extractor of secondary descriptors.
///
/// Implementations must bound their own latency; the pipeline waits for them.
pub trait AdvancedFeatureExtractor: Send + Sync {
    fn extract_advanced(&self, image_path: &Path) -> anyhow::Result<AdvancedFeatures>;
}

impl<F> AdvancedFeatureExtractor for F
where
    F: Fn(&Path) -> anyhow::Result<AdvancedFeatures> + Send + Sync,
{
    fn extract_advanced(&self, image_path: &Path) -> anyhow::Result<AdvancedFeatures> {
        self(image_path)
    }
}

/// Largest `(w, h)` with the same aspect ratio that fits in `max` x `max`.
///
/// Images already within bounds are returned unchanged. Neither side drops below 1.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let (w, h, m) = (f64::from(width), f64::from(height), f64::from(max));
    if width >= height {
        (max, ((h * m / w).round() as u32).max(1))
    } else {
        (((w * m / h).round() as u32).max(1), max)
    }
}

/// Writes images for, and calls, the advanced collaborator.
#[derive(Debug, Clone)]
pub struct AdvancedPreparer {
    temp_dir: PathBuf,
    max_dimension: u32,
}

impl AdvancedPreparer {
    pub fn new(temp_dir: impl Into<PathBuf>, max_dimension: u32) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Downscales `image` if needed.
    pub fn downscale(&self, image: &DynamicImage) -> ExtractResult<DynamicImage> {
        let (width, height) = (image.width(), image.height());
        let (dst_width, dst_height) = fit_within(width, height, self.max_dimension);
        if (dst_width, dst_height) == (width, height) {
            return Ok(image.clone());
        }

        let src = DynamicImage::ImageRgba8(image.to_rgba8());
        let mut dst = Image::new(dst_width, dst_height, PixelType::U8x4);
        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
        Resizer::new()
            .resize(&src, &mut dst, &options)
            .map_err(|e| ExtractError::external("fast_image_resize", e))?;

        let resized = RgbaImage::from_raw(dst_width, dst_height, dst.into_vec()).ok_or_else(
            || ExtractError::validation("resized buffer", "matches destination size", "short"),
        )?;
        Ok(DynamicImage::ImageRgba8(resized))
    }

    /// Writes the (downscaled) image to a fresh PNG file in the temp directory.
    ///
    /// The file is deleted when the returned handle drops.
    pub fn write_temp(&self, image: &DynamicImage) -> ExtractResult<NamedTempFile> {
        fs::create_dir_all(&self.temp_dir)
            .map_err(|e| ExtractError::io_at("create temp directory", &self.temp_dir, e))?;

        let prepared = self.downscale(image)?;
        let file = tempfile::Builder::new()
            .prefix("opt_temp_")
            .suffix(".png")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| ExtractError::io_at("create temp file", &self.temp_dir, e))?;
        prepared
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| ExtractError::from(e).with_operation("encode temp image"))?;
        Ok(file)
    }

    /// Runs `collaborator` on `image`.
    ///
    /// Errors, panics and non-finite values are absorbed: failures give an empty map and
    /// non-finite values become `0.0`.
    pub fn run(
        &self,
        collaborator: &dyn AdvancedFeatureExtractor,
        image: &DynamicImage,
    ) -> AdvancedFeatures {
        match self.try_run(collaborator, image) {
            Ok(features) => features,
            Err(e) => {
                warn!(error = %e, "advanced feature extraction failed; continuing without");
                AdvancedFeatures::new()
            }
        }
    }

    fn try_run(
        &self,
        collaborator: &dyn AdvancedFeatureExtractor,
        image: &DynamicImage,
    ) -> ExtractResult<AdvancedFeatures> {
        let temp = self.write_temp(image)?;
        debug!(path = %temp.path().display(), "temporary image written for advanced features");

        let outcome = catch_unwind(AssertUnwindSafe(|| collaborator.extract_advanced(temp.path())));
        // `temp` drops at the end of this scope on every path below.
        let features = match outcome {
            Ok(Ok(features)) => features,
            Ok(Err(e)) => return Err(ExtractError::advanced(format!("{e:#}"))),
            Err(_) => return Err(ExtractError::advanced("collaborator panicked")),
        };

        Ok(features
            .into_iter()
            .map(|(key, value)| (key, finite_or_zero(value)))
            .collect())
    }
}
