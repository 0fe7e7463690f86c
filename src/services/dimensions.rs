//! Thumbnail sizing: fit a source raster inside a bounding box while keeping
//! its aspect ratio.

use crate::models::dimensions::{BoundingBox, ImageDimensions};

/// Compute the thumbnail size for `original` inside `bounds`.
///
/// Landscape sources (width strictly greater than height) take the full box
/// width; portrait and square sources take the full box height. The other
/// side follows the aspect ratio and is rounded to the nearest pixel. When
/// the box is not square and the derived side would overflow it, the fit is
/// redone along that axis so the result never distorts the image.
///
/// A side that rounds to zero (extremely thin sources) is clamped to one
/// pixel.
pub fn compute(original: ImageDimensions, bounds: BoundingBox) -> ImageDimensions {
    let aspect = original.aspect_ratio();
    let max_w = f64::from(bounds.max_width());
    let max_h = f64::from(bounds.max_height());

    let (mut width, mut height) = if original.width() > original.height() {
        (max_w, max_w / aspect)
    } else {
        (max_h * aspect, max_h)
    };

    if height > max_h {
        height = max_h;
        width = max_h * aspect;
    }
    if width > max_w {
        width = max_w;
        height = max_w / aspect;
    }

    ImageDimensions::saturating(
        to_pixels(width).min(bounds.max_width()),
        to_pixels(height).min(bounds.max_height()),
    )
}

fn to_pixels(value: f64) -> u32 {
    // `as` saturates; NaN cannot occur since both sides are positive.
    value.round() as u32
}
