//! High-level image operations.
//!
//! These functions decide what the backend has to do for a derivative and
//! short-circuit the cases that need no pixel work at all.

use super::backend::{ImageBackend, TransformError};
use super::params::{OutputFormat, Quality, TargetSize, TransformParams};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Everything needed to turn original bytes into one derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivativePlan {
    pub target: TargetSize,
    pub square_crop: bool,
    pub format: OutputFormat,
    pub quality: Quality,
}

/// Produce the derivative bytes for `plan`.
///
/// [`TargetSize::Original`] returns the source bytes unchanged without
/// touching the backend, so originals are never re-encoded.
pub fn render_derivative<B: ImageBackend + ?Sized>(
    backend: &B,
    source: Vec<u8>,
    plan: &DerivativePlan,
) -> Result<Vec<u8>> {
    match plan.target {
        TargetSize::Original => Ok(source),
        TargetSize::Exact { width, height } => backend.transform(
            &source,
            &TransformParams {
                square_crop: plan.square_crop,
                width,
                height,
                format: plan.format,
                quality: plan.quality,
            },
        ),
    }
}

/// Square-crop an uploaded icon and store it as PNG.
pub fn crop_icon<B: ImageBackend + ?Sized>(backend: &B, upload: &[u8]) -> Result<Vec<u8>> {
    backend.crop_square(upload, OutputFormat::Png, Quality::default())
}
