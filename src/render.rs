//! Cache-backed derivative rendering.
//!
//! Ties the pieces of the image path together: a [`DerivativeKey`] names
//! the cache entry, the original store supplies source bytes on a miss, and
//! the backend cuts the derivative. Both request serving and bulk
//! pre-warming go through [`Renderer::render`].
//!
//! Everything here is blocking filesystem and CPU work. Async callers hop
//! onto the blocking pool first.

use crate::cache::{Cached, DerivativeCache, DerivativeKey};
use crate::config::{ServiceConfig, SizeTable};
use crate::error::ServiceError;
use crate::imaging::{ImageBackend, render_derivative};
use crate::model::ContentRef;
use crate::originals::OriginalStore;
use crate::sizes::{DerivativeKind, SizeClass};
use tracing::error;

pub struct Renderer {
    cache: DerivativeCache,
    originals: OriginalStore,
    backend: Box<dyn ImageBackend>,
    images: SizeTable,
    icons: SizeTable,
}

impl Renderer {
    pub fn new(
        cache: DerivativeCache,
        originals: OriginalStore,
        backend: Box<dyn ImageBackend>,
        images: SizeTable,
        icons: SizeTable,
    ) -> Self {
        Self {
            cache,
            originals,
            backend,
            images,
            icons,
        }
    }

    pub fn from_config(config: &ServiceConfig, backend: Box<dyn ImageBackend>) -> Self {
        Self::new(
            DerivativeCache::new(&config.cache_dir),
            OriginalStore::new(&config.data_dir),
            backend,
            config.images.clone(),
            config.icons.clone(),
        )
    }

    pub fn cache(&self) -> &DerivativeCache {
        &self.cache
    }

    pub fn originals(&self) -> &OriginalStore {
        &self.originals
    }

    pub fn backend(&self) -> &dyn ImageBackend {
        self.backend.as_ref()
    }

    pub fn table(&self, kind: DerivativeKind) -> &SizeTable {
        match kind {
            DerivativeKind::Image => &self.images,
            DerivativeKind::Icon => &self.icons,
        }
    }

    /// Serve the derivative from cache, cutting it from the original on a
    /// miss. A missing original is [`ServiceError::NotFound`].
    pub fn render(
        &self,
        kind: DerivativeKind,
        class: SizeClass,
        content_ref: &ContentRef,
    ) -> Result<Cached, ServiceError> {
        let key = DerivativeKey::new(kind, class, content_ref.clone());
        let plan = kind.plan(class, self.table(kind));

        self.cache.get_or_create(&key, || {
            let source = self
                .originals
                .read(kind, content_ref)?
                .ok_or(ServiceError::NotFound)?;
            render_derivative(self.backend.as_ref(), source, &plan).map_err(|source| {
                error!(
                    kind = %kind,
                    content_ref = %content_ref,
                    size = %class,
                    error = %source,
                    "derivative transform failed"
                );
                ServiceError::Transform {
                    content_ref: content_ref.to_string(),
                    size: class,
                    source,
                }
            })
        })
    }
}
