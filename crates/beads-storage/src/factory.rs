//! Backend selection and opening.
//!
//! Backends are not discovered through registration side effects. The
//! application builds a [`BackendRegistry`] at startup and each backend
//! crate installs its opener explicitly, e.g. `beads_mariadb::register`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::traits::BoxedStorage;

// ---------------------------------------------------------------------------
// Backend kind
// ---------------------------------------------------------------------------

/// The storage engines beads knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded single-file SQLite database.
    Sqlite,
    /// Version-controlled Dolt database.
    Dolt,
    /// Shared MariaDB / MySQL server.
    #[serde(rename = "mariadb")]
    MariaDb,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Dolt => write!(f, "dolt"),
            Self::MariaDb => write!(f, "mariadb"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "dolt" => Ok(Self::Dolt),
            "mariadb" | "mysql" => Ok(Self::MariaDb),
            other => Err(StorageError::UnknownBackend(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Backend-neutral open options.
///
/// Each backend reads the fields relevant to it and ignores the rest;
/// `None` means "use the backend's default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Open without mutating the schema.
    pub read_only: bool,
    /// Server host for server-based backends.
    pub server_host: Option<String>,
    /// Server port for server-based backends.
    pub server_port: Option<u16>,
    /// Server user for server-based backends.
    pub server_user: Option<String>,
    /// Database name for server-based backends.
    pub database: Option<String>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Function that opens a store of one backend kind.
///
/// Receives the path-like identifier, the open options, and the caller's
/// cancellation token.
pub type BackendOpener =
    fn(String, Options, CancellationToken) -> BoxFuture<'static, StorageResult<BoxedStorage>>;

/// Maps backend kinds to their openers.
#[derive(Default)]
pub struct BackendRegistry {
    openers: HashMap<BackendKind, BackendOpener>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the opener for `kind`, returning the one it replaced, if any.
    pub fn register(&mut self, kind: BackendKind, opener: BackendOpener) -> Option<BackendOpener> {
        debug!(backend = %kind, "registering storage backend");
        self.openers.insert(kind, opener)
    }

    /// Whether an opener is installed for `kind`.
    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.openers.contains_key(&kind)
    }

    /// Registered kinds, in no particular order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.openers.keys().copied().collect()
    }

    /// Open a store with the opener registered for `kind`.
    pub async fn open(
        &self,
        kind: BackendKind,
        path: &str,
        options: Options,
        cancel: &CancellationToken,
    ) -> StorageResult<BoxedStorage> {
        let opener = self
            .openers
            .get(&kind)
            .copied()
            .ok_or(StorageError::BackendNotRegistered(kind))?;

        info!(backend = %kind, path, read_only = options.read_only, "opening storage backend");
        opener(path.to_string(), options, cancel.clone()).await
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

// ── tests ────────────────────────────────────────────────────────────
