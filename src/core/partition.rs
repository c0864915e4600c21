//! Horizontal partitioning of an image into one region per worker.

use region_sample::Region;

use crate::error::{ExtractError, ExtractResult};

/// Splits `width` x `height` into exactly `count` full-width horizontal slices.
///
/// Slices are `height / count` rows tall and the last absorbs the remainder, so every
/// pixel row belongs to exactly one slice. When `height < count` the leading slices are
/// empty; they still count toward the merge denominator.
///
/// ```rust
/// use ballistic_features::core::partition::partition;
///
/// let regions = partition(800, 602, 4).unwrap();
/// assert_eq!(regions.len(), 4);
/// assert_eq!(regions[3].height(), 152);
/// ```
pub fn partition(width: u32, height: u32, count: usize) -> ExtractResult<Vec<Region>> {
    if count == 0 {
        return Err(ExtractError::partition(width, height, count, "no workers"));
    }
    if width == 0 || height == 0 {
        return Err(ExtractError::partition(width, height, count, "image is empty"));
    }
    let slices = u32::try_from(count).map_err(|_| {
        ExtractError::partition(width, height, count, "region count exceeds u32")
    })?;

    Ok(Region::from_size(width, height).split_rows(slices))
}
