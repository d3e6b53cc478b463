//! Shared test utilities for the photofeed test suite.
//!
//! Synthetic images are generated in memory with the `image` crate so no
//! binary fixtures live in the repository. [`TestEnv`] wires a full
//! [`PhotoService`] to a temp directory with the real Rust backend.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let env = TestEnv::new();
//! let alice = env.service.create_account("alice").await.unwrap();
//! env.service
//!     .upload_item(Some(&alice.api_key), "image/jpeg", jpeg_bytes(200, 100), "2")
//!     .await
//!     .unwrap();
//! ```

use crate::config::ServiceConfig;
use crate::imaging::RustBackend;
use crate::model::ContentRef;
use crate::service::PhotoService;
use crate::sizes::DerivativeKind;
use crate::store::MemoryStore;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

// =========================================================================
// Synthetic images
// =========================================================================

/// Gradient so resampling has something to chew on.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

/// Decode and return (width, height).
pub fn dimensions_of(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

// =========================================================================
// Service fixture
// =========================================================================

/// A service rooted in a temp directory, with the stock `default` icon in
/// place.
pub struct TestEnv {
    pub tmp: TempDir,
    pub service: PhotoService,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = ServiceConfig {
            data_dir: tmp.path().join("data"),
            cache_dir: tmp.path().join("static"),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let service = PhotoService::new(
            &config,
            Arc::new(MemoryStore::new()),
            Box::new(RustBackend::new()),
        );
        let default_icon = service
            .renderer()
            .originals()
            .path_for(DerivativeKind::Icon, &ContentRef::default_icon());
        std::fs::create_dir_all(default_icon.parent().unwrap()).unwrap();
        std::fs::write(&default_icon, png_bytes(160, 160)).unwrap();

        Self { tmp, service }
    }
}
