//! Bulk derivative generation.
//!
//! Walks every stored original image and renders each size class through
//! the same cache path requests use, so the first visitor of an old photo
//! never pays for the resample. One rayon task per (original, size class)
//! pair; the call returns once all of them have finished.
//!
//! Failures are counted and logged, never fatal: one corrupt upload must
//! not stop the rest of the batch. There is no cancellation.

use crate::cache::CacheOutcome;
use crate::model::ContentRef;
use crate::originals::OriginalsError;
use crate::render::Renderer;
use crate::sizes::{DerivativeKind, SizeClass};
use rayon::prelude::*;
use std::fmt;
use std::ops::Add;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    pub generated: usize,
    pub cached: usize,
    pub failed: usize,
}

impl PrewarmReport {
    pub fn total(&self) -> usize {
        self.generated + self.cached + self.failed
    }
}

impl Add for PrewarmReport {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            generated: self.generated + other.generated,
            cached: self.cached + other.cached,
            failed: self.failed + other.failed,
        }
    }
}

impl fmt::Display for PrewarmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} generated, {} cached, {} failed ({} total)",
            self.generated,
            self.cached,
            self.failed,
            self.total()
        )
    }
}

/// Render every image size class for every stored original.
///
/// Runs on the current rayon pool; size it before calling.
pub fn prewarm(renderer: &Renderer) -> Result<PrewarmReport, OriginalsError> {
    let originals = renderer.originals().list(DerivativeKind::Image)?;
    let jobs: Vec<(&ContentRef, SizeClass)> = originals
        .iter()
        .flat_map(|r| SizeClass::ALL.into_iter().map(move |class| (r, class)))
        .collect();
    info!(originals = originals.len(), jobs = jobs.len(), "prewarming derivatives");

    let report = jobs
        .par_iter()
        .map(|&(content_ref, class)| {
            match renderer.render(DerivativeKind::Image, class, content_ref) {
                Ok(cached) if cached.outcome == CacheOutcome::Hit => PrewarmReport {
                    cached: 1,
                    ..PrewarmReport::default()
                },
                Ok(_) => PrewarmReport {
                    generated: 1,
                    ..PrewarmReport::default()
                },
                Err(e) => {
                    warn!(content_ref = %content_ref, size = %class, error = %e, "prewarm failed");
                    PrewarmReport {
                        failed: 1,
                        ..PrewarmReport::default()
                    }
                }
            }
        })
        .reduce(PrewarmReport::default, Add::add);

    info!(%report, "prewarm finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DerivativeCache;
    use crate::config::SizeTable;
    use crate::imaging::RustBackend;
    use crate::originals::OriginalStore;
    use crate::test_helpers::{dimensions_of, jpeg_bytes};
    use std::fs;
    use tempfile::TempDir;

    fn renderer(tmp: &TempDir) -> Renderer {
        Renderer::new(
            DerivativeCache::new(tmp.path().join("static")),
            OriginalStore::new(tmp.path().join("data")),
            Box::new(RustBackend::new()),
            SizeTable::image_defaults(),
            SizeTable::icon_defaults(),
        )
    }

    #[test]
    fn empty_data_dir_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let report = prewarm(&renderer(&tmp)).unwrap();
        assert_eq!(report, PrewarmReport::default());
    }

    #[test]
    fn renders_every_size_for_every_original() {
        let tmp = TempDir::new().unwrap();
        let r = renderer(&tmp);
        let a = r
            .originals()
            .save(DerivativeKind::Image, &jpeg_bytes(120, 80))
            .unwrap();
        r.originals()
            .save(DerivativeKind::Image, &jpeg_bytes(64, 64))
            .unwrap();

        let report = prewarm(&r).unwrap();
        assert_eq!(
            report,
            PrewarmReport {
                generated: 6,
                cached: 0,
                failed: 0
            }
        );

        let small = fs::read(tmp.path().join(format!("static/image/s/{a}.jpg"))).unwrap();
        assert_eq!(dimensions_of(&small), (128, 128));
        let large = fs::read(tmp.path().join(format!("static/image/l/{a}.jpg"))).unwrap();
        assert_eq!(dimensions_of(&large), (120, 80));
    }

    #[test]
    fn second_run_is_all_cache_hits() {
        let tmp = TempDir::new().unwrap();
        let r = renderer(&tmp);
        r.originals()
            .save(DerivativeKind::Image, &jpeg_bytes(50, 40))
            .unwrap();

        prewarm(&r).unwrap();
        let again = prewarm(&r).unwrap();
        assert_eq!(again.cached, 3);
        assert_eq!(again.generated, 0);
    }

    #[test]
    fn corrupt_original_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let r = renderer(&tmp);
        r.originals()
            .save(DerivativeKind::Image, b"not a jpeg")
            .unwrap();
        r.originals()
            .save(DerivativeKind::Image, &jpeg_bytes(40, 40))
            .unwrap();

        let report = prewarm(&r).unwrap();
        // Large passes bytes through untouched, so only s and m fail
        assert_eq!(report.failed, 2);
        assert_eq!(report.generated, 4);
    }

    #[test]
    fn report_display() {
        let report = PrewarmReport {
            generated: 4,
            cached: 2,
            failed: 1,
        };
        assert_eq!(report.to_string(), "4 generated, 2 cached, 1 failed (7 total)");
    }
}
