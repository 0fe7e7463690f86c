//! src/services/thumbnail_service.rs
//!
//! ThumbnailGenerator: decodes an uploaded image, fits it inside the
//! configured bounding box and re-encodes it as PNG. Pure CPU work: no
//! network, no storage. Callers on the async runtime should run it on a
//! blocking thread.

use crate::{
    models::dimensions::{BoundingBox, ImageDimensions, ThumbnailSpec},
    services::dimensions,
};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

/// Output format of every thumbnail, whatever the source format was.
pub const THUMBNAIL_FORMAT: ImageFormat = ImageFormat::Png;
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/png";
pub const THUMBNAIL_EXTENSION: &str = ".png";

/// Resampling filter. Changing it changes output bytes for every image.
const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("invalid source image: {0}")]
    Validation(&'static str),
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),
}

pub type ThumbnailResult<T> = Result<T, ThumbnailError>;

/// An encoded thumbnail and the sizing decision behind it.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Bytes,
    pub spec: ThumbnailSpec,
}

impl Thumbnail {
    pub fn content_type(&self) -> &'static str {
        THUMBNAIL_CONTENT_TYPE
    }
}

/// Stateless once built; share one instance across events.
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    bounds: BoundingBox,
}

impl ThumbnailGenerator {
    pub fn new(bounds: BoundingBox) -> Self {
        Self { bounds }
    }

    /// Produce a PNG thumbnail of `source`.
    ///
    /// - Empty input is rejected before decoding.
    /// - The source format is sniffed from its bytes, not from a file name.
    /// - Output is deterministic for a given input and bounding box.
    pub fn generate(&self, source: &[u8]) -> ThumbnailResult<Thumbnail> {
        if source.is_empty() {
            return Err(ThumbnailError::Validation("source image is empty"));
        }

        let image = image::load_from_memory(source).map_err(ThumbnailError::Decode)?;
        let original = ImageDimensions::new(image.width(), image.height())
            .ok_or(ThumbnailError::Validation("decoded image has no pixels"))?;

        let target = dimensions::compute(original, self.bounds);
        debug!("resizing {} -> {} ({:?})", original, target, RESAMPLE_FILTER);

        let resized = image.resize_exact(target.width(), target.height(), RESAMPLE_FILTER);
        let bytes = encode(resized)?;

        Ok(Thumbnail {
            bytes,
            spec: ThumbnailSpec {
                bounds: self.bounds,
                source: original,
                target,
            },
        })
    }
}

/// Encode a raster as PNG into a fresh buffer.
///
/// PNG has no floating point sample types, so float rasters are narrowed to
/// RGBA8 first; every other layout (including alpha) is written as is.
fn encode(image: DynamicImage) -> ThumbnailResult<Bytes> {
    let image = match image {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(image.to_rgba8())
        }
        other => other,
    };

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, THUMBNAIL_FORMAT)
        .map_err(ThumbnailError::Encode)?;
    Ok(Bytes::from(buffer.into_inner()))
}
