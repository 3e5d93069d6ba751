//! Error taxonomy shared by every backend and the storage orchestrator.
//!
//! Lower-level failures are carried as [`anyhow::Error`] inside the
//! variants so that context chains survive up to the log line that
//! reports them.

use thiserror::Error;

/// Result alias used across the [`DocumentBackend`](crate::store::DocumentBackend) seam.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing credential or invalid configuration. Never retried and never
    /// converted into a fallback attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any failure talking to the remote vector index.
    #[error("remote index error: {0:#}")]
    Remote(anyhow::Error),

    /// Failure opening, reading or writing the local collection.
    #[error("local store error: {0:#}")]
    LocalStore(anyhow::Error),

    /// Both the primary and the fallback backend failed for one operation.
    #[error("{operation} failed on both backends (primary: {primary}; fallback: {fallback})")]
    BothBackendsFailed {
        operation: &'static str,
        primary: Box<StorageError>,
        fallback: Box<StorageError>,
    },
}

impl StorageError {
    pub fn remote(err: impl Into<anyhow::Error>) -> Self {
        StorageError::Remote(err.into())
    }

    pub fn local(err: impl Into<anyhow::Error>) -> Self {
        StorageError::LocalStore(err.into())
    }

    /// Configuration errors are fatal; everything else may be retried
    /// against another backend.
    pub fn is_configuration(&self) -> bool {
        matches!(self, StorageError::Configuration(_))
    }
}
