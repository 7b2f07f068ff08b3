//! Error types for the storage capability interface.

use thiserror::Error;

use crate::factory::BackendKind;

/// Alias for `Result<T, StorageError>`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced through the backend-neutral [`Storage`](crate::Storage)
/// interface.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend name in configuration is not one we know about.
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),

    /// The backend is known but no opener was registered for it.
    #[error("no opener registered for storage backend {0}")]
    BackendNotRegistered(BackendKind),

    /// The store has been closed and rejects further operations.
    #[error("storage is closed")]
    Closed,

    /// The caller cancelled the operation.
    #[error("storage operation cancelled")]
    Cancelled,

    /// A backend-specific failure, boxed so this crate stays driver-agnostic.
    #[error("{backend} backend: {source}")]
    Backend {
        backend: BackendKind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend error.
    pub fn backend(
        backend: BackendKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            backend,
            source: source.into(),
        }
    }
}
