// SPDX-License-Identifier: MIT
//! # Pixel Regions
//!
//! A [`Region`] is a half-open rectangle `[min_x, max_x) × [min_y, max_y)` in image
//! coordinates. Regions produced by [`Region::split_rows`] never overlap and together
//! cover their parent exactly once.

/// Half-open rectangle of pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Region {
    /// Creates a region; an inverted upper bound collapses to an empty region.
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        }
    }

    /// Region anchored at the origin covering a `width × height` image.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    /// True when `other` lies entirely inside `self`.
    pub fn encloses(&self, other: &Region) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Splits the region into `count` full-width horizontal slices.
    ///
    /// Every slice is `height / count` rows tall except the last, which absorbs the
    /// remainder. When the region is shorter than `count` rows the leading slices are
    /// empty and the last one holds every row. Returns no slices for `count == 0`.
    pub fn split_rows(&self, count: u32) -> Vec<Region> {
        if count == 0 {
            return Vec::new();
        }

        let slice_height = self.height() / count;
        (0..count)
            .map(|i| {
                let start = self.min_y + i * slice_height;
                let end = if i == count - 1 {
                    self.max_y
                } else {
                    start + slice_height
                };
                Region::new(self.min_x, start, self.max_x, end)
            })
            .collect()
    }
}
