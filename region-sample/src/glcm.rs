// SPDX-License-Identifier: MIT
//! # Gray-Level Co-occurrence Statistics
//!
//! Texture descriptors built from horizontal pixel pairs `(x, y)` / `(x + offset, y)`
//! inside one region. The scan stops `offset` pixels short of the region's upper bound
//! on both axes, so no pair ever reads outside the region.
//!
//! For a co-occurrence table with counts `c(i, j)` and total `N`:
//!
//! ```text
//! contrast    = Σ c(i,j)·(i-j)² / N
//! energy      = Σ (c(i,j) / N)²
//! homogeneity = Σ c(i,j) / (1 + (i-j)²) / N
//! ```
//!
//! A region that yields no pairs reports all three values as `0.0`.

use crate::pixel::{luminance, PixelSource};
use crate::region::Region;

const LEVELS: usize = 256;

/// Texture descriptors for one region.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GlcmFeatures {
    pub contrast: f64,
    pub energy: f64,
    pub homogeneity: f64,
}

/// Dense 256×256 co-occurrence table.
struct CoOccurrence {
    counts: Vec<u32>,
    total: u64,
}

impl CoOccurrence {
    fn new() -> Self {
        Self {
            counts: vec![0; LEVELS * LEVELS],
            total: 0,
        }
    }

    #[inline]
    fn record(&mut self, a: u8, b: u8) {
        self.counts[a as usize * LEVELS + b as usize] += 1;
        self.total += 1;
    }

    /// Non-zero cells as `(gray_a, gray_b, count)`.
    fn cells(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(i, &c)| (i / LEVELS, i % LEVELS, c))
    }

    fn features(&self) -> GlcmFeatures {
        if self.total == 0 {
            return GlcmFeatures::default();
        }

        let total = self.total as f64;
        let mut contrast = 0.0;
        let mut energy = 0.0;
        let mut homogeneity = 0.0;
        for (a, b, count) in self.cells() {
            let count = count as f64;
            let diff = a as f64 - b as f64;
            let diff_sq = diff * diff;
            let p = count / total;

            contrast += count * diff_sq;
            energy += p * p;
            homogeneity += count / (1.0 + diff_sq);
        }

        GlcmFeatures {
            contrast: contrast / total,
            energy,
            homogeneity: homogeneity / total,
        }
    }
}

/// Computes co-occurrence texture statistics for `region` at horizontal `offset`.
///
/// `region` must lie inside `source.bounds()`; [`RegionSampler`](crate::RegionSampler)
/// checks this before calling.
pub fn compute_glcm<S>(source: &S, region: Region, offset: u32) -> GlcmFeatures
where
    S: PixelSource + ?Sized,
{
    let end_x = region.max_x.saturating_sub(offset);
    let end_y = region.max_y.saturating_sub(offset);

    let mut table = CoOccurrence::new();
    for y in region.min_y..end_y {
        for x in region.min_x..end_x {
            let a = luminance(source.rgb(x, y));
            let b = luminance(source.rgb(x + offset, y));
            table.record(a, b);
        }
    }

    table.features()
}
