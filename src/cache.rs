//! On-disk derivative cache.
//!
//! Decoding, cropping and resampling a photo costs far more than reading a
//! few kilobytes from disk, so every derivative is computed once and then
//! served from the filesystem.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **content- and size-addressed**: a [`DerivativeKey`] is the
//! tuple (kind, size class, content reference, output format) and maps to
//! exactly one path:
//!
//! ```text
//! {root}/{kind}/{size}/{content_ref}.{ext}
//! static/image/s/3f2a…9c.jpg
//! static/icon/m/default.png
//! ```
//!
//! Originals are immutable once uploaded, so the bytes behind a key never
//! change. That is the whole invalidation story: entries are never
//! re-validated against the source, and a corrupt file is trusted until
//! someone deletes it by hand.
//!
//! ## Writes
//!
//! A miss runs the caller's producer and writes the result to a uniquely
//! named temp file beside the target, then renames it into place. Readers
//! see either no file or the complete file. A failed producer writes
//! nothing.
//!
//! ## Concurrency
//!
//! Two processes missing the same key may both produce and both rename;
//! the outputs are byte-identical so the last rename wins harmlessly.
//! Inside one process, concurrent misses for the same key are coalesced:
//! the first caller produces while the others wait on a per-key lock and
//! then read the fresh file.

use crate::imaging::OutputFormat;
use crate::model::ContentRef;
use crate::sizes::{DerivativeKind, SizeClass};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cannot read cached derivative {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write cached derivative {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Identifies one derivative blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativeKey {
    pub kind: DerivativeKind,
    pub size: SizeClass,
    pub content_ref: ContentRef,
    pub format: OutputFormat,
}

impl DerivativeKey {
    /// Key using the kind's natural output format.
    pub fn new(kind: DerivativeKind, size: SizeClass, content_ref: ContentRef) -> Self {
        Self {
            kind,
            size,
            content_ref,
            format: kind.format(),
        }
    }

    /// Path of this key relative to the cache root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.as_str())
            .join(self.size.as_str())
            .join(format!("{}.{}", self.content_ref, self.format.extension()))
    }
}

impl fmt::Display for DerivativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.size, self.content_ref)
    }
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Generated,
}

/// Bytes returned from [`DerivativeCache::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached {
    pub bytes: Vec<u8>,
    pub outcome: CacheOutcome,
}

/// Filesystem-backed, write-once derivative store.
pub struct DerivativeCache {
    root: PathBuf,
    inflight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    stats: CacheStats,
}

impl DerivativeCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inflight: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `key`.
    pub fn path_for(&self, key: &DerivativeKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Return the cached bytes for `key`, running `producer` and persisting
    /// its output on a miss.
    ///
    /// Producer errors pass through untouched and leave nothing on disk.
    pub fn get_or_create<E, F>(&self, key: &DerivativeKey, producer: F) -> Result<Cached, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        let path = self.path_for(key);

        if let Some(bytes) = read_if_present(&path)? {
            debug!(key = %key, "derivative cache hit");
            self.stats.hit();
            return Ok(Cached {
                bytes,
                outcome: CacheOutcome::Hit,
            });
        }

        let key_lock = self.acquire(&path);
        let result = {
            let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.fill(key, &path, producer)
        };
        self.release(&path, key_lock);
        result
    }

    /// Miss path, run while holding the per-key lock.
    fn fill<E, F>(&self, key: &DerivativeKey, path: &Path, producer: F) -> Result<Cached, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        // Another caller may have filled it while we waited
        if let Some(bytes) = read_if_present(path)? {
            debug!(key = %key, "derivative filled by concurrent request");
            self.stats.hit();
            return Ok(Cached {
                bytes,
                outcome: CacheOutcome::Hit,
            });
        }

        let bytes = producer()?;
        write_atomic(path, &bytes).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        self.stats.miss();
        debug!(key = %key, bytes = bytes.len(), path = %path.display(), "derivative stored");
        Ok(Cached {
            bytes,
            outcome: CacheOutcome::Generated,
        })
    }

    fn acquire(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        inflight
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, path: &Path, key_lock: Arc<Mutex<()>>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        // The map holds one reference and we hold the other: nobody waits.
        if Arc::strong_count(&key_lock) == 2 {
            inflight.remove(path);
        }
    }
}

fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CacheError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `bytes` to `path` via temp file + rename, creating parent
/// directories. Readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if result.is_err()
        && let Err(cleanup) = fs::remove_file(&tmp)
        && cleanup.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp file");
    }
    result
}

/// Hit/miss counters, shared across threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits() > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.hits(),
                self.misses(),
                self.total()
            )
        } else {
            write!(f, "{} generated", self.misses())
        }
    }
}
