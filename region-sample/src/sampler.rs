// SPDX-License-Identifier: MIT
//! # Region Sampler
//!
//! Binds one set of sampling parameters to every region of an image so the per-region
//! results are comparable when they are averaged later. The only shared state is an
//! atomic call counter, which lets callers observe how many regions were actually
//! computed (for example, to confirm a cache hit skipped the work entirely).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::glcm::{compute_glcm, GlcmFeatures};
use crate::pixel::PixelSource;
use crate::region::Region;
use crate::shape::{compute_shape, ShapeFeatures};

/// Parameters applied identically to every region of one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    /// Horizontal pixel distance for co-occurrence pairs.
    pub glcm_offset: u32,
    /// Luminance strictly below this value is foreground.
    pub foreground_threshold: u8,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            glcm_offset: 1,
            foreground_threshold: 128,
        }
    }
}

/// All local descriptors for one region.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RegionFeatures {
    pub glcm: GlcmFeatures,
    pub shape: ShapeFeatures,
}

impl RegionFeatures {
    /// Replaces any NaN or infinite value with `0.0`.
    pub fn sanitized(self) -> Self {
        let f = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            glcm: GlcmFeatures {
                contrast: f(self.glcm.contrast),
                energy: f(self.glcm.energy),
                homogeneity: f(self.glcm.homogeneity),
            },
            shape: ShapeFeatures {
                circularity: f(self.shape.circularity),
                aspect_ratio: f(self.shape.aspect_ratio),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// The region reaches past the image.
    RegionOutOfBounds { region: Region, bounds: Region },
    /// A zero offset would pair every pixel with itself.
    InvalidOffset(u32),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::RegionOutOfBounds { region, bounds } => write!(
                f,
                "Region {:?} lies outside image bounds {}x{}",
                region,
                bounds.width(),
                bounds.height()
            ),
            SampleError::InvalidOffset(offset) => {
                write!(f, "GLCM offset must be at least 1 (got {})", offset)
            }
        }
    }
}

impl std::error::Error for SampleError {}

/// Computes [`RegionFeatures`] with fixed parameters.
#[derive(Debug)]
pub struct RegionSampler {
    params: SamplerParams,
    calls: AtomicU64,
}

impl RegionSampler {
    pub fn new(params: SamplerParams) -> Self {
        Self {
            params,
            calls: AtomicU64::new(0),
        }
    }

    pub fn params(&self) -> SamplerParams {
        self.params
    }

    /// Number of regions sampled so far, including failed attempts.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Computes texture and shape descriptors for the pixels of `region`.
    ///
    /// Results are always finite; a degenerate region yields zeros.
    pub fn sample<S>(&self, source: &S, region: Region) -> Result<RegionFeatures, SampleError>
    where
        S: PixelSource + ?Sized,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.params.glcm_offset == 0 {
            return Err(SampleError::InvalidOffset(0));
        }
        let bounds = source.bounds();
        if !bounds.encloses(&region) {
            return Err(SampleError::RegionOutOfBounds { region, bounds });
        }

        let features = RegionFeatures {
            glcm: compute_glcm(source, region, self.params.glcm_offset),
            shape: compute_shape(source, region, self.params.foreground_threshold),
        };
        Ok(features.sanitized())
    }
}
