//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::load_from_memory` |
//! | Square crop | [`square_crop`] → `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality from params) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//!
//! Encoding always targets an in-memory buffer. A failed encode therefore
//! never leaves a truncated file behind; persisting the bytes is the
//! [cache's](crate::cache) job.

use super::backend::{ImageBackend, TransformError};
use super::calculations::square_crop_region;
use super::params::{OutputFormat, Quality, TransformParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Crop an image to the centered square returned by
/// [`square_crop_region`](super::square_crop_region).
pub fn square_crop(img: &DynamicImage) -> DynamicImage {
    let region = square_crop_region(img.width(), img.height());
    img.crop_imm(region.x, region.y, region.width, region.height)
}

fn decode(source: &[u8]) -> Result<DynamicImage, TransformError> {
    image::load_from_memory(source).map_err(|e| TransformError::Decode(e.to_string()))
}

/// Encode into an in-memory buffer.
///
/// JPEG has no alpha channel, so RGBA sources are flattened to RGB first.
fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, TransformError> {
    let encode_err = |e: image::ImageError| TransformError::Encode {
        format: format.to_string(),
        reason: e.to_string(),
    };

    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
            rgb.write_with_encoder(encoder).map_err(encode_err)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut buf);
            img.write_with_encoder(encoder).map_err(encode_err)?;
        }
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn crop_square(
        &self,
        source: &[u8],
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, TransformError> {
        let img = decode(source)?;
        encode(&square_crop(&img), format, quality)
    }

    fn transform(
        &self,
        source: &[u8],
        params: &TransformParams,
    ) -> Result<Vec<u8>, TransformError> {
        if params.width == 0 || params.height == 0 {
            return Err(TransformError::InvalidDimensions {
                width: params.width,
                height: params.height,
            });
        }

        let img = decode(source)?;
        let img = if params.square_crop {
            square_crop(&img)
        } else {
            img
        };
        let resized = img.resize_exact(params.width, params.height, FilterType::Lanczos3);
        encode(&resized, params.format, params.quality)
    }
}
