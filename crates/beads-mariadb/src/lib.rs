//! # beads-mariadb
//!
//! MariaDB / MySQL server backend for beads.
//!
//! Multiple independent processes can share one server, so this backend has
//! to cope with a database that may not exist yet, a schema another client
//! is evolving at the same moment, and connections that go stale when the
//! server restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  MariaDbStore (Storage impl)            │
//! │    with_retry: backoff on transient     │
//! │    errors, cancellable                  │
//! ├─────────────────────────────────────────┤
//! │  SchemaEngine                           │
//! │    baseline + seed (split statements)   │
//! │    indexes, legacy FK drop, views       │
//! │    named migrations, in order           │
//! ├─────────────────────────────────────────┤
//! │  connection::establish                  │
//! │    lazy sqlx pool, CREATE DATABASE,     │
//! │    ping                                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use beads_mariadb::{Config, MariaDbStore};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let store = MariaDbStore::open(&Config::default(), &cancel).await?;
//! store.execute("DELETE FROM dirty_issues", &cancel).await?;
//! store.close().await?;
//! ```

pub mod classify;
pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod migrations;
pub mod retry;
pub mod schema;
pub mod splitter;
pub mod store;

// ── re-exports ───────────────────────────────────────────────────────

pub use config::{Config, ConnectionParams, PoolSettings};
pub use error::{MariaDbError, MariaDbResult};
pub use factory::{config_from_options, register};
pub use migrations::{MIGRATIONS, Migration, list_migrations};
pub use retry::{RetryError, RetryPolicy};
pub use schema::SchemaEngine;
pub use splitter::split_statements;
pub use store::MariaDbStore;
