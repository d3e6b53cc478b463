//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations every backend must
//! support: square-crop and transform. All of them take encoded bytes in
//! and hand encoded bytes back, so callers never see a half-written output.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::{OutputFormat, Quality, TransformParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("cannot decode source image: {0}")]
    Decode(String),
    #[error("cannot encode {format} output: {reason}")]
    Encode { format: String, reason: String },
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Trait for image processing backends.
///
/// Backends are stateless and CPU-bound; async callers should run them on a
/// blocking thread.
pub trait ImageBackend: Send + Sync {
    /// Square-crop `source` around its center and re-encode it.
    fn crop_square(
        &self,
        source: &[u8],
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, TransformError>;

    /// Decode, optionally square-crop, resize to exact dimensions, encode.
    fn transform(&self, source: &[u8], params: &TransformParams)
    -> Result<Vec<u8>, TransformError>;
}
