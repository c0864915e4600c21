// SPDX-License-Identifier: MIT
//! # Foreground Shape Statistics
//!
//! A pixel is foreground when its luminance is below the configured threshold. Within a
//! region we count foreground pixels (area), foreground pixels with at least one
//! non-foreground 8-neighbour inside the region (perimeter), and the bounding box of the
//! foreground. Neighbours outside the region are ignored, so a slice boundary never
//! counts as an edge.
//!
//! ```text
//! circularity  = 4π·area / perimeter²
//! aspect_ratio = bbox_width / max(bbox_height, 1)
//! ```
//!
//! Both are `0.0` when the region has no foreground or no edge pixels.

use std::f64::consts::PI;

use crate::pixel::{luminance, PixelSource};
use crate::region::Region;

/// Contour descriptors for one region.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShapeFeatures {
    pub circularity: f64,
    pub aspect_ratio: f64,
}

/// True when the pixel belongs to the object rather than the background.
#[inline]
pub fn is_foreground(rgb: [u8; 3], threshold: u8) -> bool {
    luminance(rgb) < threshold
}

/// Computes contour statistics for `region`.
pub fn compute_shape<S>(source: &S, region: Region, threshold: u8) -> ShapeFeatures
where
    S: PixelSource + ?Sized,
{
    if region.is_empty() {
        return ShapeFeatures::default();
    }

    let width = region.width() as usize;
    let height = region.height() as usize;

    // Classify once; the edge test reads each pixel up to eight more times.
    let mut mask = Vec::with_capacity(width * height);
    for y in region.min_y..region.max_y {
        for x in region.min_x..region.max_x {
            mask.push(is_foreground(source.rgb(x, y), threshold));
        }
    }

    let mut area = 0u64;
    let mut perimeter = 0u64;
    let (mut min_x, mut max_x) = (width, 0usize);
    let (mut min_y, mut max_y) = (height, 0usize);

    for row in 0..height {
        for col in 0..width {
            if !mask[row * width + col] {
                continue;
            }
            area += 1;
            min_x = min_x.min(col);
            max_x = max_x.max(col);
            min_y = min_y.min(row);
            max_y = max_y.max(row);
            if touches_background(&mask, width, height, col, row) {
                perimeter += 1;
            }
        }
    }

    if area == 0 || perimeter == 0 {
        return ShapeFeatures::default();
    }

    let area = area as f64;
    let perimeter = perimeter as f64;
    let bbox_width = (max_x - min_x) as f64;
    let bbox_height = (max_y - min_y) as f64;

    ShapeFeatures {
        circularity: 4.0 * PI * area / (perimeter * perimeter),
        aspect_ratio: bbox_width / bbox_height.max(1.0),
    }
}

fn touches_background(mask: &[bool], width: usize, height: usize, col: usize, row: usize) -> bool {
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = col as i64 + dx;
            let ny = row as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            if !mask[ny as usize * width + nx as usize] {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    const DARK: u8 = 40;
    const LIGHT: u8 = 220;

    fn canvas(width: u32, height: u32, dark: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if dark(x, y) { DARK } else { LIGHT }])
        })
    }

    #[test]
    fn test_all_background_is_zero() {
        let img = canvas(16, 16, |_, _| false);
        let f = compute_shape(&img, Region::from_size(16, 16), 128);
        assert_eq!(f, ShapeFeatures::default());
    }

    #[test]
    fn test_fully_foreground_region_has_no_edges() {
        let img = canvas(8, 8, |_, _| true);
        let f = compute_shape(&img, Region::from_size(8, 8), 128);
        assert_eq!(f, ShapeFeatures::default());
    }

    #[test]
    fn test_square_block() {
        // 4×4 dark block in a 10×10 light canvas: 16 pixels, 12 on the rim.
        let img = canvas(10, 10, |x, y| (3..7).contains(&x) && (3..7).contains(&y));
        let f = compute_shape(&img, Region::from_size(10, 10), 128);

        let expected = 4.0 * PI * 16.0 / 144.0;
        assert!((f.circularity - expected).abs() < 1e-12);
        assert_eq!(f.aspect_ratio, 1.0);
    }

    #[test]
    fn test_wide_bar_aspect_ratio() {
        let img = canvas(30, 10, |x, y| (5..25).contains(&x) && (4..6).contains(&y));
        let f = compute_shape(&img, Region::from_size(30, 10), 128);
        // bbox spans columns 5..=24 and rows 4..=5
        assert_eq!(f.aspect_ratio, 19.0);
    }

    #[test]
    fn test_region_edge_is_not_a_contour() {
        // Dark band filling rows 0..5; the lower half of the image is light.
        let img = canvas(6, 10, |_, y| y < 5);
        let top = compute_shape(&img, Region::new(0, 0, 6, 5), 128);
        assert_eq!(top, ShapeFeatures::default());

        let whole = compute_shape(&img, Region::from_size(6, 10), 128);
        assert!(whole.circularity > 0.0);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(is_foreground([100, 100, 100], 128));
        assert!(!is_foreground([200, 200, 200], 128));
        assert!(!is_foreground([0, 0, 0], 0));
    }
}
