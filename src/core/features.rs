//! # Feature Model
//!
//! Fixed-shape result types for the pipeline, with the open name-to-value map kept at the
//! serialisation boundary.
//!
//! - [`region_feature_map`]: one region's descriptors as a [`FeatureMap`]
//! - [`LocalFeatures`]: the merged whole-image vector; every vocabulary key is a field, so
//!   a value of this type always carries the full vocabulary
//! - [`ExtractionOutput`]: local features plus the optional advanced map
//!
//! Feature names are the keys consumed downstream and must not change.

use std::collections::BTreeMap;

use region_sample::RegionFeatures;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, ExtractResult};

/// Feature name to value. Ordered so serialised output is stable.
pub type FeatureMap = BTreeMap<String, f64>;

/// Secondary descriptors from the advanced collaborator. Empty when it is absent or failed.
pub type AdvancedFeatures = FeatureMap;

pub const GLCM_CONTRAST: &str = "glcm_contrast";
pub const GLCM_ENERGY: &str = "glcm_energy";
pub const GLCM_HOMOGENEITY: &str = "glcm_homogeneity";
pub const CIRCULARITY: &str = "circularity";
pub const ASPECT_RATIO: &str = "aspect_ratio";
pub const IMAGE_WIDTH: &str = "image_width";
pub const IMAGE_HEIGHT: &str = "image_height";
pub const IMAGE_AREA: &str = "image_area";

/// Keys every merged local feature map carries.
pub const LOCAL_VOCABULARY: [&str; 8] = [
    GLCM_CONTRAST,
    GLCM_ENERGY,
    GLCM_HOMOGENEITY,
    CIRCULARITY,
    ASPECT_RATIO,
    IMAGE_WIDTH,
    IMAGE_HEIGHT,
    IMAGE_AREA,
];

/// Replaces NaN and infinities with `0.0`.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// One region's descriptors keyed by feature name.
pub fn region_feature_map(features: &RegionFeatures) -> FeatureMap {
    let features = features.sanitized();
    FeatureMap::from([
        (GLCM_CONTRAST.to_string(), features.glcm.contrast),
        (GLCM_ENERGY.to_string(), features.glcm.energy),
        (GLCM_HOMOGENEITY.to_string(), features.glcm.homogeneity),
        (CIRCULARITY.to_string(), features.shape.circularity),
        (ASPECT_RATIO.to_string(), features.shape.aspect_ratio),
    ])
}

/// Merged whole-image local features.
///
/// Serialises to a flat JSON object whose keys are exactly [`LOCAL_VOCABULARY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalFeatures {
    pub glcm_contrast: f64,
    pub glcm_energy: f64,
    pub glcm_homogeneity: f64,
    pub circularity: f64,
    pub aspect_ratio: f64,
    pub image_width: f64,
    pub image_height: f64,
    pub image_area: f64,
}

impl LocalFeatures {
    /// Builds from a merged map, which must contain every vocabulary key.
    pub fn from_map(map: &FeatureMap) -> ExtractResult<Self> {
        let get = |key: &str| {
            map.get(key).copied().map(finite_or_zero).ok_or_else(|| {
                ExtractError::validation("feature map", "contains every vocabulary key", key)
            })
        };
        Ok(Self {
            glcm_contrast: get(GLCM_CONTRAST)?,
            glcm_energy: get(GLCM_ENERGY)?,
            glcm_homogeneity: get(GLCM_HOMOGENEITY)?,
            circularity: get(CIRCULARITY)?,
            aspect_ratio: get(ASPECT_RATIO)?,
            image_width: get(IMAGE_WIDTH)?,
            image_height: get(IMAGE_HEIGHT)?,
            image_area: get(IMAGE_AREA)?,
        })
    }

    pub fn to_map(&self) -> FeatureMap {
        FeatureMap::from([
            (GLCM_CONTRAST.to_string(), self.glcm_contrast),
            (GLCM_ENERGY.to_string(), self.glcm_energy),
            (GLCM_HOMOGENEITY.to_string(), self.glcm_homogeneity),
            (CIRCULARITY.to_string(), self.circularity),
            (ASPECT_RATIO.to_string(), self.aspect_ratio),
            (IMAGE_WIDTH.to_string(), self.image_width),
            (IMAGE_HEIGHT.to_string(), self.image_height),
            (IMAGE_AREA.to_string(), self.image_area),
        ])
    }

    pub fn is_finite(&self) -> bool {
        self.to_map().values().all(|v| v.is_finite())
    }
}

/// What one extraction returns, and what the cache stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub local: LocalFeatures,
    #[serde(default)]
    pub advanced: AdvancedFeatures,
}

impl ExtractionOutput {
    pub fn new(local: LocalFeatures, advanced: AdvancedFeatures) -> Self {
        Self { local, advanced }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use region_sample::{GlcmFeatures, ShapeFeatures};

    #[test]
    fn test_region_map_keys() {
        let map = region_feature_map(&RegionFeatures::default());
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![ASPECT_RATIO, CIRCULARITY, GLCM_CONTRAST, GLCM_ENERGY, GLCM_HOMOGENEITY]
        );
    }

    #[test]
    fn test_region_map_sanitizes() {
        let features = RegionFeatures {
            glcm: GlcmFeatures {
                contrast: f64::NAN,
                energy: 0.5,
                homogeneity: f64::INFINITY,
            },
            shape: ShapeFeatures::default(),
        };
        let map = region_feature_map(&features);
        assert_eq!(map[GLCM_CONTRAST], 0.0);
        assert_eq!(map[GLCM_ENERGY], 0.5);
        assert_eq!(map[GLCM_HOMOGENEITY], 0.0);
    }

    #[test]
    fn test_local_features_map_round_trip() {
        let local = LocalFeatures {
            glcm_contrast: 12.5,
            circularity: 0.8,
            image_width: 800.0,
            image_height: 600.0,
            image_area: 480_000.0,
            ..Default::default()
        };
        let map = local.to_map();
        assert_eq!(map.len(), LOCAL_VOCABULARY.len());
        assert_eq!(LocalFeatures::from_map(&map).unwrap(), local);
    }

    #[test]
    fn test_from_map_requires_vocabulary() {
        let mut map = LocalFeatures::default().to_map();
        map.remove(IMAGE_AREA);
        let err = LocalFeatures::from_map(&map).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_serialises_as_flat_vocabulary() {
        let json = serde_json::to_value(LocalFeatures::default()).unwrap();
        let object = json.as_object().unwrap();
        for key in LOCAL_VOCABULARY {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object.len(), LOCAL_VOCABULARY.len());
    }
}
