//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what derivative to build) and the [`backend`](super::backend)
//! (which does the pixel work). Keeping them separate lets tests swap in a
//! recording mock backend.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`OutputFormat`]: Encoded output format (JPEG or PNG).
//! - [`TargetSize`]: Exact output dimensions, or the "original, unresized" sentinel.
//! - [`TransformParams`]: Everything one transform needs.

use super::backend::TransformError;
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Encoded output format of a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension used for cached blobs.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// Resolve a format from a file extension. Anything other than
    /// jpg/jpeg/png is rejected as [`TransformError::UnsupportedFormat`].
    pub fn from_extension(ext: &str) -> Result<Self, TransformError> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(TransformError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Requested output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSize {
    /// Resample to exactly this many pixels.
    Exact { width: u32, height: u32 },
    /// Pass the source bytes through untouched.
    Original,
}

impl TargetSize {
    /// Square target of `side` pixels.
    pub fn square(side: u32) -> Self {
        TargetSize::Exact {
            width: side,
            height: side,
        }
    }

    /// Build a target from a configured width. A negative width is the
    /// "no resize" sentinel.
    pub fn from_width(width: i32) -> Self {
        if width < 0 {
            TargetSize::Original
        } else {
            Self::square(width as u32)
        }
    }

    pub fn is_original(self) -> bool {
        matches!(self, TargetSize::Original)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSize::Exact { width, height } => write!(f, "{width}x{height}"),
            TargetSize::Original => f.write_str("original"),
        }
    }
}

/// Parameters for a decode → (crop) → resize → encode transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    /// Square-crop before resizing.
    pub square_crop: bool,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}
