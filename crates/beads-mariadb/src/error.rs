//! Error types for the beads-mariadb crate.
//!
//! All operations return [`MariaDbError`] via [`MariaDbResult`]. Variants
//! follow the failure taxonomy of the backend: configuration problems,
//! an unreachable server, schema evolution failures, and the lifecycle
//! errors (`Closed`, `Cancelled`) a caller can match on directly.

use beads_storage::{BackendKind, StorageError};
use thiserror::Error;

/// Alias for `Result<T, MariaDbError>`.
pub type MariaDbResult<T> = Result<T, MariaDbError>;

/// Errors produced by the MariaDB backend.
#[derive(Debug, Error)]
pub enum MariaDbError {
    // -- Setup errors -------------------------------------------------------
    /// Missing or invalid connection parameters. Never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The administrative connection was refused: the server is not running
    /// or not listening on the configured address.
    #[error(
        "failed to connect to MariaDB server at {host}:{port}: {source}\n\n\
         The MariaDB server may not be running. Try:\n  \
         sudo systemctl start mariadb    # On systemd systems\n  \
         brew services start mariadb     # On macOS with Homebrew"
    )]
    Unreachable {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    /// `CREATE DATABASE IF NOT EXISTS` failed for a reason other than the
    /// database already existing.
    #[error("failed to create database {database}: {source}")]
    CreateDatabase {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// The liveness probe on a freshly opened pool failed.
    #[error("failed to ping MariaDB database: {0}")]
    Ping(#[source] sqlx::Error),

    // -- Schema evolution errors -------------------------------------------
    /// A baseline or seed statement failed. `statement` is truncated.
    #[error("failed to {phase}: {source}\nStatement: {statement}")]
    Schema {
        phase: &'static str,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// A named migration failed.
    #[error("mariadb migration {name:?} failed: {source}")]
    Migration {
        name: &'static str,
        #[source]
        source: Box<MariaDbError>,
    },

    /// Schema initialisation as a whole failed; wraps the step that broke.
    #[error("failed to initialize schema: {0}")]
    SchemaInit(#[source] Box<MariaDbError>),

    // -- Runtime errors ----------------------------------------------------
    /// A query failed; `context` names what was being attempted.
    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Raw driver error without further context.
    #[error("mariadb error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The store has been closed; no implicit reconnection is attempted.
    #[error("mariadb store is closed")]
    Closed,

    /// The caller's cancellation token fired.
    #[error("mariadb operation cancelled")]
    Cancelled,
}

impl MariaDbError {
    /// Attach context to a driver error.
    pub fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            context: context.into(),
            source,
        }
    }

    /// The underlying driver error, if this variant carries one.
    pub fn sqlx(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Unreachable { source, .. }
            | Self::CreateDatabase { source, .. }
            | Self::Schema { source, .. }
            | Self::Query { source, .. } => Some(source),
            Self::Ping(source) | Self::Sqlx(source) => Some(source),
            Self::Migration { source, .. } | Self::SchemaInit(source) => source.sqlx(),
            Self::Config(_) | Self::Closed | Self::Cancelled => None,
        }
    }
}

impl From<MariaDbError> for StorageError {
    fn from(err: MariaDbError) -> Self {
        match err {
            MariaDbError::Closed => StorageError::Closed,
            MariaDbError::Cancelled => StorageError::Cancelled,
            other => StorageError::backend(BackendKind::MariaDb, other),
        }
    }
}
