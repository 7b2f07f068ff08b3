//! Schema evolution.
//!
//! [`SchemaEngine::evolve`] brings a live database to the latest schema and
//! is run on every open. Every step is a no-op when its change is already in
//! place, so running it against a current schema is safe:
//!
//! 1. baseline tables ([`SCHEMA`]),
//! 2. default configuration rows ([`DEFAULT_CONFIG`]),
//! 3. secondary indexes added after the baseline shipped,
//! 4. removal of the legacy `fk_dep_depends_on` foreign key,
//! 5. the `ready_issues` / `blocked_issues` views,
//! 6. the named [`Migration`]s, in order.
//!
//! A read-only store skips all of it.

use sqlx::{Executor, MySqlPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::classify;
use crate::error::{MariaDbError, MariaDbResult};
use crate::migrations::{self, IndexSpec, MIGRATIONS, Migration};
use crate::splitter::{executable_statements, truncate_for_error};

/// Baseline table definitions.
pub const SCHEMA: &str = include_str!("sql/schema.sql");

/// Default rows for the `config` table.
pub const DEFAULT_CONFIG: &str = include_str!("sql/default_config.sql");

/// Issues that are open and have no open blocker.
pub const READY_ISSUES_VIEW: &str = r#"
CREATE OR REPLACE VIEW ready_issues AS
SELECT i.*
FROM issues i
WHERE i.status = 'open'
  AND (i.ephemeral = 0 OR i.ephemeral IS NULL)
  AND NOT EXISTS (
    SELECT 1
    FROM dependencies d
    JOIN issues blocker ON d.depends_on_id = blocker.id
    WHERE d.issue_id = i.id
      AND d.type = 'blocks'
      AND blocker.status IN ('open', 'in_progress', 'blocked', 'deferred')
  )
"#;

/// Unclosed issues with at least one open blocker, and how many.
pub const BLOCKED_ISSUES_VIEW: &str = r#"
CREATE OR REPLACE VIEW blocked_issues AS
SELECT i.*,
  (SELECT COUNT(*)
   FROM dependencies d
   JOIN issues blocker ON d.depends_on_id = blocker.id
   WHERE d.issue_id = i.id
     AND d.type = 'blocks'
     AND blocker.status IN ('open', 'in_progress', 'blocked', 'deferred')
  ) AS blocked_by_count
FROM issues i
WHERE i.status IN ('open', 'in_progress', 'blocked', 'deferred')
  AND EXISTS (
    SELECT 1
    FROM dependencies d
    JOIN issues blocker ON d.depends_on_id = blocker.id
    WHERE d.issue_id = i.id
      AND d.type = 'blocks'
      AND blocker.status IN ('open', 'in_progress', 'blocked', 'deferred')
  )
"#;

/// Indexes that `CREATE TABLE IF NOT EXISTS` cannot add to older databases.
///
/// The baseline already declares these inline, so on a fresh database each
/// entry is a no-op. They only take effect on `issues` tables created before
/// the index was part of the baseline.
const INDEX_MIGRATIONS: &[IndexSpec] = &[IndexSpec::new(
    "issues",
    "idx_issues_issue_type",
    "issue_type",
)];

/// Foreign key on `dependencies.depends_on_id` from older baselines. It
/// rejects edges to issues that live outside this database.
const LEGACY_DEPENDS_ON_FK: &str = "fk_dep_depends_on";

/// Applies the baseline schema and all migrations.
#[derive(Debug, Clone, Copy)]
pub struct SchemaEngine<'m> {
    migrations: &'m [Migration],
}

impl Default for SchemaEngine<'static> {
    fn default() -> Self {
        Self::new(MIGRATIONS)
    }
}

impl<'m> SchemaEngine<'m> {
    /// Engine that runs `migrations` after the baseline.
    pub fn new(migrations: &'m [Migration]) -> Self {
        Self { migrations }
    }

    /// The migrations this engine runs, in order.
    pub fn migrations(&self) -> &'m [Migration] {
        self.migrations
    }

    /// Bring the database behind `pool` up to date.
    ///
    /// Does nothing when `read_only` is set. Returns
    /// [`MariaDbError::Cancelled`] if `cancel` fires first.
    pub async fn evolve(
        &self,
        pool: &MySqlPool,
        read_only: bool,
        cancel: &CancellationToken,
    ) -> MariaDbResult<()> {
        if read_only {
            info!("read-only store, skipping schema evolution");
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MariaDbError::Cancelled),
            result = self.apply(pool) => result,
        }
    }

    async fn apply(&self, pool: &MySqlPool) -> MariaDbResult<()> {
        info!(migrations = self.migrations.len(), "evolving schema");

        run_script(pool, SCHEMA, "create schema").await?;
        run_script(pool, DEFAULT_CONFIG, "insert default config").await?;

        for index in INDEX_MIGRATIONS {
            migrations::ensure_index(pool, index).await?;
        }

        drop_legacy_depends_on_fk(pool).await?;

        pool.execute(READY_ISSUES_VIEW)
            .await
            .map_err(|e| MariaDbError::query("failed to create ready_issues view", e))?;
        pool.execute(BLOCKED_ISSUES_VIEW)
            .await
            .map_err(|e| MariaDbError::query("failed to create blocked_issues view", e))?;

        migrations::run_migrations(pool, self.migrations).await?;

        info!("schema is up to date");
        Ok(())
    }
}

/// Split `script` and execute each non-comment statement in order.
async fn run_script(pool: &MySqlPool, script: &str, phase: &'static str) -> MariaDbResult<()> {
    for stmt in executable_statements(script) {
        debug!(phase, statement = %truncate_for_error(&stmt), "executing statement");
        pool.execute(stmt.as_str())
            .await
            .map_err(|source| MariaDbError::Schema {
                phase,
                statement: truncate_for_error(&stmt),
                source,
            })?;
    }
    Ok(())
}

async fn drop_legacy_depends_on_fk(pool: &MySqlPool) -> MariaDbResult<()> {
    let present = migrations::foreign_key_exists(pool, "dependencies", LEGACY_DEPENDS_ON_FK)
        .await
        .map_err(|e| MariaDbError::query(format!("checking {LEGACY_DEPENDS_ON_FK}"), e))?;
    if !present {
        return Ok(());
    }

    let stmt = format!("ALTER TABLE dependencies DROP FOREIGN KEY {LEGACY_DEPENDS_ON_FK}");
    match pool.execute(stmt.as_str()).await {
        Ok(_) => {
            info!(constraint = LEGACY_DEPENDS_ON_FK, "dropped legacy foreign key");
            Ok(())
        }
        Err(e) if classify::is_missing_constraint(&e) => Ok(()),
        Err(e) => Err(MariaDbError::query(
            format!("failed to drop {LEGACY_DEPENDS_ON_FK}"),
            e,
        )),
    }
}
