//! Errors as seen by request handlers.
//!
//! Every internal failure is folded into one of four classes, and each class
//! has a fixed response status. Not-found deliberately covers "you may not
//! see this" too, so private items cannot be probed for existence.

use crate::cache::CacheError;
use crate::imaging::TransformError;
use crate::originals::OriginalsError;
use crate::sizes::SizeClass;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed input; nothing was changed.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Unknown, or not visible to the caller.
    #[error("not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("cannot render {content_ref} at size {size}: {source}")]
    Transform {
        content_ref: String,
        size: SizeClass,
        #[source]
        source: TransformError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// HTTP-equivalent status for the response.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound => 404,
            ServiceError::Storage(_) | ServiceError::Transform { .. } | ServiceError::Io(_) => 500,
        }
    }

    /// Client mistakes are answered quietly; everything else gets logged.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        let message = e.to_string();
        match e {
            CacheError::Read { source, .. } | CacheError::Write { source, .. } => {
                ServiceError::Io(std::io::Error::new(source.kind(), message))
            }
        }
    }
}

impl From<OriginalsError> for ServiceError {
    fn from(e: OriginalsError) -> Self {
        let message = e.to_string();
        match e {
            OriginalsError::Read { source, .. }
            | OriginalsError::Write { source, .. }
            | OriginalsError::Remove { source, .. } => {
                ServiceError::Io(std::io::Error::new(source.kind(), message))
            }
        }
    }
}
