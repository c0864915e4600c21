// SPDX-License-Identifier: MIT
//! # region-sample: Per-Region Texture and Shape Statistics
//!
//! This crate computes the local descriptors used by the ballistic feature pipeline for
//! exactly the pixels inside one rectangular region of an image. It knows nothing about
//! other regions, worker threads or caching: every function here is a pure read of the
//! image, so any number of regions of the same image can be sampled concurrently.
//!
//! ## Key Components
//!
//! - [`region`]: half-open pixel rectangles and row partitioning
//! - [`pixel`]: the read-only [`PixelSource`](pixel::PixelSource) contract and luminance
//! - [`glcm`]: gray-level co-occurrence statistics (contrast, energy, homogeneity)
//! - [`shape`]: foreground contour statistics (circularity, aspect ratio)
//! - [`sampler`]: [`RegionSampler`](sampler::RegionSampler), which applies one fixed set of
//!   parameters to every region of an image
//!
//! ## Usage Example
//!
//! ```rust
//! use image::{Rgb, RgbImage};
//! use region_sample::{Region, RegionSampler, SamplerParams};
//!
//! let img = RgbImage::from_pixel(64, 48, Rgb([200, 200, 200]));
//! let sampler = RegionSampler::new(SamplerParams::default());
//!
//! let features = sampler.sample(&img, Region::new(0, 0, 64, 24)).unwrap();
//! assert_eq!(features.shape.circularity, 0.0); // nothing below the threshold
//! assert_eq!(sampler.calls(), 1);
//! ```

pub mod glcm;
pub mod pixel;
pub mod region;
pub mod sampler;
pub mod shape;

pub use glcm::GlcmFeatures;
pub use pixel::{luminance, PixelSource};
pub use region::Region;
pub use sampler::{RegionFeatures, RegionSampler, SampleError, SamplerParams};
pub use shape::ShapeFeatures;
