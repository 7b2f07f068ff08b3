//! # beads-storage
//!
//! Backend-neutral storage capability interface for beads.
//!
//! Higher layers (issue model, CLI) never talk to a database driver
//! directly. They hold a [`Storage`] trait object obtained from a
//! [`BackendRegistry`], which maps a [`BackendKind`] to the opener a backend
//! crate registered at startup.
//!
//! ## Quick start
//!
//! ```ignore
//! use beads_storage::{BackendKind, BackendRegistry, Options};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut registry = BackendRegistry::new();
//! beads_mariadb::register(&mut registry);
//!
//! let cancel = CancellationToken::new();
//! let store = registry
//!     .open(BackendKind::MariaDb, "beads", Options::default(), &cancel)
//!     .await?;
//! store.ping(&cancel).await?;
//! store.close().await?;
//! ```

pub mod error;
pub mod factory;
pub mod traits;

// ── re-exports ───────────────────────────────────────────────────────

pub use error::{StorageError, StorageResult};
pub use factory::{BackendKind, BackendOpener, BackendRegistry, Options};
pub use traits::{BoxedStorage, Storage};
