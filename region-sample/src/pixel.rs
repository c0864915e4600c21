// SPDX-License-Identifier: MIT
//! Read-only pixel access.

use image::{GenericImageView, Pixel};

use crate::region::Region;

/// Read-only access to an image's pixels.
///
/// Implementations must tolerate concurrent reads from several worker threads; there is
/// no cursor or other interior state. Coordinates are always relative to the image's
/// own origin, so `bounds()` starts at `(0, 0)`.
pub trait PixelSource: Send + Sync {
    /// Full extent of the image.
    fn bounds(&self) -> Region;

    /// 8-bit RGB value at `(x, y)`. Callers only pass coordinates inside `bounds()`.
    fn rgb(&self, x: u32, y: u32) -> [u8; 3];
}

impl<I> PixelSource for I
where
    I: GenericImageView + Send + Sync,
    I::Pixel: Pixel<Subpixel = u8>,
{
    fn bounds(&self) -> Region {
        Region::from_size(self.width(), self.height())
    }

    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.get_pixel(x, y).to_rgb().0
    }
}

/// Luminance-weighted gray level (ITU-R BT.601), truncated to 8 bits.
#[inline]
pub fn luminance([r, g, b]: [u8; 3]) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}
