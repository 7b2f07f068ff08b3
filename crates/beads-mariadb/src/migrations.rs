//! Named schema migrations.
//!
//! [`MIGRATIONS`] is the ordered, append-only history of schema changes made
//! after the baseline. Each entry must be idempotent: it inspects
//! `information_schema` first and only issues DDL when the change is
//! missing, and a concurrent client winning the race ("duplicate column",
//! "duplicate key") still counts as success.
//!
//! New migrations go at the end of the list. Never reorder or remove an
//! entry once it has shipped.

use std::fmt;

use futures::future::BoxFuture;
use sqlx::{Executor, MySqlPool};
use tracing::{debug, info};

use crate::classify;
use crate::error::{MariaDbError, MariaDbResult};

/// A migration action: checks for its change and applies it if absent.
pub type MigrationFn = for<'a> fn(&'a MySqlPool) -> BoxFuture<'a, MariaDbResult<()>>;

/// A named, idempotent schema migration.
#[derive(Clone, Copy)]
pub struct Migration {
    /// Unique, stable identifier.
    pub name: &'static str,
    pub action: MigrationFn,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("name", &self.name).finish()
    }
}

/// All migrations, in the order they must run.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        name: "wisp_type_column",
        action: wisp_type_column,
    },
    Migration {
        name: "spec_id_column",
        action: spec_id_column,
    },
];

/// Names of the registered migrations, in order.
pub fn list_migrations() -> Vec<&'static str> {
    MIGRATIONS.iter().map(|m| m.name).collect()
}

/// Run `migrations` in order, stopping at the first failure.
pub async fn run_migrations(pool: &MySqlPool, migrations: &[Migration]) -> MariaDbResult<()> {
    for migration in migrations {
        debug!(migration = migration.name, "running migration");
        (migration.action)(pool)
            .await
            .map_err(|source| MariaDbError::Migration {
                name: migration.name,
                source: Box::new(source),
            })?;
    }
    debug!(count = migrations.len(), "migrations complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Migrations
// ---------------------------------------------------------------------------

fn wisp_type_column(pool: &MySqlPool) -> BoxFuture<'_, MariaDbResult<()>> {
    Box::pin(ensure_column(pool, "issues", "wisp_type", "VARCHAR(32) DEFAULT ''"))
}

fn spec_id_column(pool: &MySqlPool) -> BoxFuture<'_, MariaDbResult<()>> {
    Box::pin(async move {
        ensure_column(pool, "issues", "spec_id", "VARCHAR(1024)").await?;
        // Prefix index: the full utf8mb4 column exceeds InnoDB's key limit.
        ensure_index(pool, &IndexSpec::new("issues", "idx_issues_spec_id", "spec_id(255)")).await
    })
}

// ---------------------------------------------------------------------------
// Catalog helpers
// ---------------------------------------------------------------------------

/// A secondary index to create if missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub table: &'static str,
    pub name: &'static str,
    /// Column list as written inside `ON table(...)`.
    pub columns: &'static str,
}

impl IndexSpec {
    pub const fn new(table: &'static str, name: &'static str, columns: &'static str) -> Self {
        Self {
            table,
            name,
            columns,
        }
    }

    fn create_statement(&self) -> String {
        format!("CREATE INDEX {} ON {}({})", self.name, self.table, self.columns)
    }
}

pub(crate) async fn column_exists(
    pool: &MySqlPool,
    table: &str,
    column: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub(crate) async fn index_exists(
    pool: &MySqlPool,
    table: &str,
    index: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?",
    )
    .bind(table)
    .bind(index)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub(crate) async fn foreign_key_exists(
    pool: &MySqlPool,
    table: &str,
    constraint: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.referential_constraints \
         WHERE constraint_schema = DATABASE() AND table_name = ? AND constraint_name = ?",
    )
    .bind(table)
    .bind(constraint)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Add `column` to `table` unless it is already there.
pub(crate) async fn ensure_column(
    pool: &MySqlPool,
    table: &'static str,
    column: &'static str,
    definition: &'static str,
) -> MariaDbResult<()> {
    let exists = column_exists(pool, table, column)
        .await
        .map_err(|e| MariaDbError::query(format!("checking {column} column"), e))?;
    if exists {
        debug!(table, column, "column already present");
        return Ok(());
    }

    let stmt = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
    match pool.execute(stmt.as_str()).await {
        Ok(_) => {
            info!(table, column, "added column");
            Ok(())
        }
        Err(e) if classify::is_duplicate_column(&e) => {
            debug!(table, column, "column added concurrently");
            Ok(())
        }
        Err(e) => Err(MariaDbError::query(format!("adding {column} column"), e)),
    }
}

/// Create `index` unless it is already there.
pub(crate) async fn ensure_index(pool: &MySqlPool, index: &IndexSpec) -> MariaDbResult<()> {
    let exists = index_exists(pool, index.table, index.name)
        .await
        .map_err(|e| MariaDbError::query(format!("checking index {}", index.name), e))?;
    if exists {
        debug!(index = index.name, "index already present");
        return Ok(());
    }

    match pool.execute(index.create_statement().as_str()).await {
        Ok(_) => {
            info!(table = index.table, index = index.name, "created index");
            Ok(())
        }
        Err(e) if classify::is_duplicate(&e) => {
            debug!(index = index.name, "index created concurrently");
            Ok(())
        }
        Err(e) => Err(MariaDbError::query(format!("creating index {}", index.name), e)),
    }
}
