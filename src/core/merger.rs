//! # Region Feature Merger
//!
//! Folds per-region feature maps into one whole-image vector.
//!
//! Each key's merged value is the arithmetic mean over *all* regions: a region that never
//! reports a key contributes zero, and the denominator is always the total region count.
//! Downstream classification thresholds are tuned against this weighting.
//!
//! Image-level keys (`image_width`, `image_height`, `image_area`) are computed once from
//! the full bounds and never averaged.

use std::collections::BTreeMap;

use region_sample::Region;

use crate::core::features::{
    finite_or_zero, FeatureMap, LocalFeatures, IMAGE_AREA, IMAGE_HEIGHT, IMAGE_WIDTH,
};
use crate::error::{ExtractError, ExtractResult};

/// Stateless merger of per-region results.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionFeatureMerger;

impl RegionFeatureMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merges `regions` into an open map and appends the image-level keys.
    ///
    /// The result does not depend on the order of `regions`: each key's contributions are
    /// summed in a canonical order, so shuffled inputs produce bit-identical output.
    pub fn merge_map(&self, regions: &[FeatureMap], image: Region) -> ExtractResult<FeatureMap> {
        if regions.is_empty() {
            return Err(ExtractError::collection(0, 0, "no region results to merge"));
        }
        let count = regions.len() as f64;

        let mut contributions: FeatureMap = FeatureMap::new();
        let mut per_key: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for map in regions {
            for (key, value) in map {
                per_key
                    .entry(key.as_str())
                    .or_default()
                    .push(finite_or_zero(*value) / count);
            }
        }
        for (key, mut values) in per_key {
            values.sort_by(f64::total_cmp);
            let sum: f64 = values.iter().sum();
            contributions.insert(key.to_string(), finite_or_zero(sum));
        }

        contributions.insert(IMAGE_WIDTH.to_string(), f64::from(image.width()));
        contributions.insert(IMAGE_HEIGHT.to_string(), f64::from(image.height()));
        contributions.insert(IMAGE_AREA.to_string(), image.area() as f64);
        Ok(contributions)
    }

    /// Merges into the typed vocabulary.
    pub fn merge(&self, regions: &[FeatureMap], image: Region) -> ExtractResult<LocalFeatures> {
        LocalFeatures::from_map(&self.merge_map(regions, image)?)
    }
}
