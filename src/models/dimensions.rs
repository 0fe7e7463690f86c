//! Value types describing image sizes and the box a thumbnail must fit in.

use crate::errors::ConfigError;
use serde::Serialize;
use std::fmt;

/// Maximum width and height a thumbnail may occupy.
///
/// Both bounds are strictly positive; a zero bound is rejected when the
/// box is built, so every `BoundingBox` in the process is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    max_width: u32,
    max_height: u32,
}

impl BoundingBox {
    /// Default thumbnail edge length in pixels.
    pub const DEFAULT_EDGE: u32 = 150;

    pub fn new(max_width: u32, max_height: u32) -> Result<Self, ConfigError> {
        if max_width == 0 || max_height == 0 {
            return Err(ConfigError::InvalidBoundingBox {
                width: max_width,
                height: max_height,
            });
        }
        Ok(Self {
            max_width,
            max_height,
        })
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            max_width: Self::DEFAULT_EDGE,
            max_height: Self::DEFAULT_EDGE,
        }
    }
}

/// Width and height of a raster, both at least one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    width: u32,
    height: u32,
}

impl ImageDimensions {
    /// Returns `None` when either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// Builds dimensions, raising any zero side to one pixel.
    pub fn saturating(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sizing decision for one source image. Recomputed per event, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThumbnailSpec {
    pub bounds: BoundingBox,
    pub source: ImageDimensions,
    pub target: ImageDimensions,
}
