//! Image transform engine: decode, square-crop, resize, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Square crop** | [`square_crop_region`] + `crop_imm` |
//! | **Resize** | Lanczos3 via `resize_exact` |
//! | **Encode** | JPEG / PNG into memory |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for crop geometry (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining parameters + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{ImageBackend, TransformError};
pub use calculations::{CropRegion, square_crop_region};
pub use operations::{DerivativePlan, crop_icon, render_derivative};
pub use params::{OutputFormat, Quality, TargetSize, TransformParams};
pub use rust_backend::{RustBackend, square_crop};
