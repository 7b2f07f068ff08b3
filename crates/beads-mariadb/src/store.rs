//! The MariaDB-backed store.
//!
//! [`MariaDbStore::open`] resolves configuration, establishes a pinged pool
//! (creating the database if needed) and evolves the schema unless the store
//! is read-only. A store is only ever handed out fully initialised.
//!
//! After open, every database call goes through [`MariaDbStore::with_retry`],
//! which re-issues the operation on transient connection errors under the
//! store's [`RetryPolicy`]. A server that refuses connections is reported as
//! [`MariaDbError::Unreachable`] straight away rather than after the pool's
//! acquire timeout.
//!
//! Lifecycle state is split in two: an [`AtomicBool`] answers "is this store
//! closed?" without locking, and an [`RwLock`] guards the pool reference so
//! a concurrent `close` cannot race an operation picking up the pool.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use beads_storage::{BackendKind, Storage, StorageResult};
use sqlx::mysql::MySqlPool;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, MySql};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::classify;
use crate::config::{Config, ConnectionParams};
use crate::connection;
use crate::error::{MariaDbError, MariaDbResult};
use crate::retry::{self, RetryError, RetryPolicy};
use crate::schema::SchemaEngine;

/// A store backed by a shared MariaDB / MySQL server.
pub struct MariaDbStore {
    pool: RwLock<Option<MySqlPool>>,
    closed: AtomicBool,
    host: String,
    port: u16,
    database: String,
    target: String,
    read_only: bool,
    retry_policy: RetryPolicy,
}

impl MariaDbStore {
    // ── open ─────────────────────────────────────────────────────────

    /// Open a store, running schema evolution with the built-in migrations.
    pub async fn open(config: &Config, cancel: &CancellationToken) -> MariaDbResult<Self> {
        let params = config.resolve()?;
        Self::open_with(&params, SchemaEngine::default(), cancel).await
    }

    /// Open a store from resolved parameters with an explicit schema engine.
    pub async fn open_with(
        params: &ConnectionParams,
        engine: SchemaEngine<'_>,
        cancel: &CancellationToken,
    ) -> MariaDbResult<Self> {
        let pool = connection::establish(params, cancel).await?;

        if let Err(err) = engine.evolve(&pool, params.read_only, cancel).await {
            pool.close().await;
            return Err(match err {
                MariaDbError::Cancelled => MariaDbError::Cancelled,
                other => MariaDbError::SchemaInit(Box::new(other)),
            });
        }

        info!(
            database = %params.database,
            read_only = params.read_only,
            "mariadb store opened"
        );
        Ok(Self::from_pool(pool, params))
    }

    fn from_pool(pool: MySqlPool, params: &ConnectionParams) -> Self {
        Self {
            pool: RwLock::new(Some(pool)),
            closed: AtomicBool::new(false),
            host: params.host.clone(),
            port: params.port,
            database: params.database.clone(),
            target: params.redacted_target(),
            read_only: params.read_only,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for post-open operations.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    // ── accessors ────────────────────────────────────────────────────

    /// Database name. Doubles as the store's path-like identifier.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Connection target with the password masked.
    pub fn connection_target(&self) -> &str {
        &self.target
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether [`MariaDbStore::close`] has been called. Lock-free.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The underlying pool, for callers that need raw access.
    pub fn pool(&self) -> MariaDbResult<MySqlPool> {
        if self.is_closed() {
            return Err(MariaDbError::Closed);
        }
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(MariaDbError::Closed)
    }

    // ── operations ───────────────────────────────────────────────────

    /// Run `op` against the pool, retrying transient connection errors.
    ///
    /// `op` is called with a handle to the pool for every attempt. A final
    /// failure is reported with `context` naming the operation.
    pub async fn with_retry<T, F, Fut>(
        &self,
        context: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> MariaDbResult<T>
    where
        F: FnMut(MySqlPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.pool()?;
        let result = retry::retry(&self.retry_policy, cancel, classify::is_retryable, || {
            op(pool.clone())
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(RetryError::Cancelled) => Err(MariaDbError::Cancelled),
            Err(RetryError::Failed(sqlx::Error::PoolClosed)) if self.is_closed() => {
                Err(MariaDbError::Closed)
            }
            Err(RetryError::Failed(err)) if classify::is_connection_refused(&err) => {
                Err(MariaDbError::Unreachable {
                    host: self.host.clone(),
                    port: self.port,
                    source: err,
                })
            }
            Err(RetryError::Failed(err)) => Err(MariaDbError::query(context, err)),
        }
    }

    /// Check out one connection, failing fast on a refused dial.
    async fn checkout(&self, pool: &MySqlPool) -> Result<PoolConnection<MySql>, sqlx::Error> {
        connection::checkout(pool, &self.host, self.port).await
    }

    /// Liveness check.
    pub async fn ping(&self, cancel: &CancellationToken) -> MariaDbResult<()> {
        self.with_retry("pinging mariadb", cancel, |pool| async move {
            let mut conn = self.checkout(&pool).await?;
            conn.ping().await
        })
        .await
    }

    /// Execute one statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, cancel: &CancellationToken) -> MariaDbResult<u64> {
        self.with_retry("executing statement", cancel, |pool| async move {
            let mut conn = self.checkout(&pool).await?;
            (&mut *conn).execute(sql).await.map(|done| done.rows_affected())
        })
        .await
    }

    /// Check out a single connection from the pool.
    pub async fn acquire(&self, cancel: &CancellationToken) -> MariaDbResult<PoolConnection<MySql>> {
        self.with_retry("acquiring connection", cancel, |pool| async move {
            self.checkout(&pool).await
        })
        .await
    }

    /// Close the pool. Later calls are no-ops; later operations fail with
    /// [`MariaDbError::Closed`].
    pub async fn close(&self) -> MariaDbResult<()> {
        self.closed.store(true, Ordering::Release);
        let pool = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();

        match pool {
            Some(pool) => {
                pool.close().await;
                info!(database = %self.database, "mariadb store closed");
            }
            None => debug!(database = %self.database, "mariadb store already closed"),
        }
        Ok(())
    }
}

impl fmt::Debug for MariaDbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MariaDbStore")
            .field("target", &self.target)
            .field("read_only", &self.read_only)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Storage for MariaDbStore {
    fn backend(&self) -> BackendKind {
        BackendKind::MariaDb
    }

    fn path(&self) -> &str {
        &self.database
    }

    fn is_closed(&self) -> bool {
        MariaDbStore::is_closed(self)
    }

    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()> {
        Ok(MariaDbStore::ping(self, cancel).await?)
    }

    async fn execute(&self, sql: &str, cancel: &CancellationToken) -> StorageResult<u64> {
        Ok(MariaDbStore::execute(self, sql, cancel).await?)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(MariaDbStore::close(self).await?)
    }
}

// ── tests ────────────────────────────────────────────────────────────
