//! The [`Storage`] capability trait.
//!
//! Every backend (server-based, embedded, version-controlled) implements
//! this trait so callers can open, probe, use, and release a store without
//! knowing which engine sits behind it.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StorageResult;
use crate::factory::BackendKind;

/// A type-erased, shareable storage handle.
pub type BoxedStorage = Box<dyn Storage>;

/// Capability interface shared by all storage backends.
///
/// Network-bound methods take a [`CancellationToken`]; cancelling it aborts
/// the in-flight call and any pending retry backoff, and the method returns
/// [`StorageError::Cancelled`](crate::StorageError::Cancelled).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Which backend implements this store.
    fn backend(&self) -> BackendKind;

    /// Path-like identifier of the store.
    ///
    /// File-based backends return a filesystem path; server backends return
    /// the database name.
    fn path(&self) -> &str;

    /// Whether [`Storage::close`] has been called.
    fn is_closed(&self) -> bool;

    /// Liveness check against the underlying engine.
    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()>;

    /// Execute a single statement and return the number of affected rows.
    async fn execute(&self, sql: &str, cancel: &CancellationToken) -> StorageResult<u64>;

    /// Release all resources. Calling this more than once is not an error.
    async fn close(&self) -> StorageResult<()>;
}
