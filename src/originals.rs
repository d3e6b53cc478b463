//! Uploaded originals, stored once per content reference.
//!
//! ```text
//! {data_dir}/image/{ref}.jpg   feed photos, exactly as uploaded
//! {data_dir}/icon/{ref}.png    avatars, already square-cropped
//! ```
//!
//! Derivatives are cut from these files and never written back here.

use crate::cache::write_atomic;
use crate::model::ContentRef;
use crate::sizes::DerivativeKind;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum OriginalsError {
    #[error("cannot read original {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot store original {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot remove original {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct OriginalStore {
    root: PathBuf,
}

impl OriginalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: DerivativeKind, content_ref: &ContentRef) -> PathBuf {
        self.root.join(kind.as_str()).join(format!(
            "{}.{}",
            content_ref,
            kind.format().extension()
        ))
    }

    /// Store `bytes` under a freshly generated reference.
    pub fn save(&self, kind: DerivativeKind, bytes: &[u8]) -> Result<ContentRef, OriginalsError> {
        let content_ref = ContentRef::generate();
        let path = self.path_for(kind, &content_ref);
        write_atomic(&path, bytes).map_err(|source| OriginalsError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(kind = %kind, content_ref = %content_ref, bytes = bytes.len(), "original stored");
        Ok(content_ref)
    }

    /// Read an original; `None` when it was never stored.
    pub fn read(
        &self,
        kind: DerivativeKind,
        content_ref: &ContentRef,
    ) -> Result<Option<Vec<u8>>, OriginalsError> {
        let path = self.path_for(kind, content_ref);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(OriginalsError::Read { path, source }),
        }
    }

    /// Delete an original. Returns whether a file was there.
    pub fn remove(
        &self,
        kind: DerivativeKind,
        content_ref: &ContentRef,
    ) -> Result<bool, OriginalsError> {
        let path = self.path_for(kind, content_ref);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(OriginalsError::Remove { path, source }),
        }
    }

    pub fn exists(&self, kind: DerivativeKind, content_ref: &ContentRef) -> bool {
        self.path_for(kind, content_ref).is_file()
    }

    /// Every stored original of `kind`, sorted by reference.
    ///
    /// Files whose stem is not a valid reference, or whose extension does
    /// not match the kind, are skipped with a warning. A missing kind
    /// directory yields an empty list.
    pub fn list(&self, kind: DerivativeKind) -> Result<Vec<ContentRef>, OriginalsError> {
        let dir = self.root.join(kind.as_str());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let ext = kind.format().extension();

        let mut refs = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| OriginalsError::Read {
                path: e.path().map_or_else(|| dir.clone(), Path::to_path_buf),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some(ext)
            {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            match ContentRef::parse(stem) {
                Ok(r) => refs.push(r),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping original"),
            }
        }
        refs.sort();
        Ok(refs)
    }
}
