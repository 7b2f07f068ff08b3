//! Integration tests for the beads-mariadb crate.
//!
//! Tests that need a live server are `#[ignore]`d. Run them with
//! `cargo test -p beads-mariadb --test integration -- --ignored` after
//! exporting `BEADS_TEST_MARIADB_HOST` (plus optional
//! `BEADS_TEST_MARIADB_PORT` / `BEADS_TEST_MARIADB_USER` and the usual
//! `BEADS_MARIADB_PASSWORD`). Each such test works in its own throwaway
//! database.

use std::sync::atomic::{AtomicU32, Ordering};

use beads_mariadb::{Config, MariaDbError, MariaDbStore, SchemaEngine, list_migrations};
use beads_storage::{BackendKind, BackendRegistry, Options, StorageError};
use sqlx::Executor;
use tokio_util::sync::CancellationToken;

static DB_COUNTER: AtomicU32 = AtomicU32::new(0);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("beads_mariadb=debug")
        .with_test_writer()
        .try_init();
}

/// Config for a fresh database on the test server.
fn server_config(tag: &str) -> Config {
    let host = std::env::var("BEADS_TEST_MARIADB_HOST")
        .expect("BEADS_TEST_MARIADB_HOST must be set to run live-server tests");
    let port = std::env::var("BEADS_TEST_MARIADB_PORT")
        .ok()
        .and_then(|p| p.parse().ok());
    let user = std::env::var("BEADS_TEST_MARIADB_USER").ok();
    let database = format!(
        "beads_it_{tag}_{}_{}",
        std::process::id(),
        DB_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    init_tracing();
    Config {
        host: Some(host),
        port,
        user,
        database: Some(database),
        ..Config::default()
    }
}

async fn drop_database(store: &MariaDbStore) {
    let cancel = CancellationToken::new();
    let stmt = format!("DROP DATABASE IF EXISTS `{}`", store.database());
    store.execute(&stmt, &cancel).await.unwrap();
    store.close().await.unwrap();
}

async fn column_count(store: &MariaDbStore, column: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = 'issues' AND column_name = ?",
    )
    .bind(column)
    .fetch_one(&store.pool().unwrap())
    .await
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Connection setup
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unreachable_server_reports_remedy() {
    init_tracing();
    // Port 1 is privileged and never runs a MySQL server: connect is refused.
    let config = Config {
        host: Some("127.0.0.1".into()),
        port: Some(1),
        ..Config::default()
    };
    let err = MariaDbStore::open(&config, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, MariaDbError::Unreachable { port: 1, .. }),
        "unexpected error: {err}"
    );
    let msg = err.to_string();
    assert!(msg.contains("127.0.0.1:1"));
    assert!(msg.contains("may not be running"));
}

#[tokio::test]
async fn invalid_config_fails_before_dialling() {
    let config = Config {
        database: Some("no spaces allowed".into()),
        ..Config::default()
    };
    let err = MariaDbStore::open(&config, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MariaDbError::Config(_)));
}

#[tokio::test]
async fn registry_surfaces_backend_errors() {
    let mut registry = BackendRegistry::new();
    beads_mariadb::register(&mut registry);
    let options = Options {
        server_host: Some("127.0.0.1".into()),
        server_port: Some(1),
        ..Options::default()
    };
    let Err(err) = registry
        .open(BackendKind::MariaDb, "beads", options, &CancellationToken::new())
        .await
    else {
        panic!("opening an unreachable server should fail");
    };
    assert!(matches!(
        err,
        StorageError::Backend {
            backend: BackendKind::MariaDb,
            ..
        }
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Schema evolution against a live server
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
#[ignore = "needs a MariaDB server at BEADS_TEST_MARIADB_HOST"]
async fn open_creates_database_and_schema() {
    let config = server_config("open");
    let cancel = CancellationToken::new();
    let store = MariaDbStore::open(&config, &cancel).await.unwrap();

    store.ping(&cancel).await.unwrap();
    for table in ["issues", "dependencies", "labels", "comments", "events", "config"] {
        store
            .execute(&format!("SELECT COUNT(*) FROM {table}"), &cancel)
            .await
            .unwrap();
    }
    store.execute("SELECT * FROM ready_issues", &cancel).await.unwrap();
    store.execute("SELECT * FROM blocked_issues", &cancel).await.unwrap();

    let seeded: String = sqlx::query_scalar("SELECT value FROM config WHERE `key` = 'compact_tier1_days'")
        .fetch_one(&store.pool().unwrap())
        .await
        .unwrap();
    assert_eq!(seeded, "30");

    assert_eq!(column_count(&store, "wisp_type").await, 1);
    assert_eq!(column_count(&store, "spec_id").await, 1);

    drop_database(&store).await;
}

#[tokio::test]
#[ignore = "needs a MariaDB server at BEADS_TEST_MARIADB_HOST"]
async fn open_twice_is_idempotent_and_keeps_config() {
    let config = server_config("twice");
    let cancel = CancellationToken::new();

    let first = MariaDbStore::open(&config, &cancel).await.unwrap();
    first
        .execute("UPDATE config SET value = '7' WHERE `key` = 'compact_tier1_days'", &cancel)
        .await
        .unwrap();
    first.close().await.unwrap();

    let second = MariaDbStore::open(&config, &cancel).await.unwrap();
    let value: String = sqlx::query_scalar("SELECT value FROM config WHERE `key` = 'compact_tier1_days'")
        .fetch_one(&second.pool().unwrap())
        .await
        .unwrap();
    assert_eq!(value, "7", "seed rows must not overwrite existing config");

    drop_database(&second).await;
}

#[tokio::test]
#[ignore = "needs a MariaDB server at BEADS_TEST_MARIADB_HOST"]
async fn rerunning_column_migration_does_not_duplicate() {
    let config = server_config("rerun");
    let cancel = CancellationToken::new();
    let store = MariaDbStore::open(&config, &cancel).await.unwrap();
    let pool = store.pool().unwrap();

    SchemaEngine::default().evolve(&pool, false, &cancel).await.unwrap();
    SchemaEngine::default().evolve(&pool, false, &cancel).await.unwrap();

    assert_eq!(column_count(&store, "wisp_type").await, 1);
    assert_eq!(column_count(&store, "spec_id").await, 1);

    drop_database(&store).await;
}

#[tokio::test]
#[ignore = "needs a MariaDB server at BEADS_TEST_MARIADB_HOST"]
async fn migrations_upgrade_a_pre_migration_schema() {
    let config = server_config("upgrade");
    let cancel = CancellationToken::new();
    let params = config.resolve().unwrap();

    // Baseline only: no named migrations.
    let store = MariaDbStore::open_with(&params, SchemaEngine::new(&[]), &cancel)
        .await
        .unwrap();
    assert_eq!(column_count(&store, "wisp_type").await, 0);
    assert_eq!(column_count(&store, "spec_id").await, 0);

    // Simulate an old baseline that still carried the restrictive FK.
    store
        .pool()
        .unwrap()
        .execute(
            "ALTER TABLE dependencies ADD CONSTRAINT fk_dep_depends_on \
             FOREIGN KEY (depends_on_id) REFERENCES issues(id)",
        )
        .await
        .unwrap();
    store.close().await.unwrap();

    let upgraded = MariaDbStore::open(&config, &cancel).await.unwrap();
    assert_eq!(column_count(&upgraded, "wisp_type").await, 1);
    assert_eq!(column_count(&upgraded, "spec_id").await, 1);

    let fk: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.referential_constraints \
         WHERE constraint_schema = DATABASE() AND constraint_name = 'fk_dep_depends_on'",
    )
    .fetch_one(&upgraded.pool().unwrap())
    .await
    .unwrap();
    assert_eq!(fk, 0);

    // Edges to issues outside this database are now accepted.
    upgraded
        .execute(
            "INSERT INTO issues (id, title, description, design, acceptance_criteria, notes) \
             VALUES ('bd-1', 'local', '', '', '', '')",
            &cancel,
        )
        .await
        .unwrap();
    upgraded
        .execute(
            "INSERT INTO dependencies (issue_id, depends_on_id) VALUES ('bd-1', 'external:other:bd-9')",
            &cancel,
        )
        .await
        .unwrap();

    drop_database(&upgraded).await;
}

#[tokio::test]
#[ignore = "needs a MariaDB server at BEADS_TEST_MARIADB_HOST"]
async fn read_only_open_skips_schema() {
    let config = server_config("ro");
    let cancel = CancellationToken::new();
    let read_only = Config {
        read_only: true,
        ..config.clone()
    };

    let store = MariaDbStore::open(&read_only, &cancel).await.unwrap();
    assert!(store.is_read_only());
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE()",
    )
    .fetch_one(&store.pool().unwrap())
    .await
    .unwrap();
    assert_eq!(tables, 0);

    drop_database(&store).await;
}

#[tokio::test]
#[ignore = "needs a MariaDB server at BEADS_TEST_MARIADB_HOST"]
async fn closed_store_rejects_use() {
    let config = server_config("closed");
    let cancel = CancellationToken::new();
    let store = MariaDbStore::open(&config, &cancel).await.unwrap();
    let name = store.database().to_string();

    store.close().await.unwrap();
    store.close().await.unwrap();
    assert!(matches!(store.ping(&cancel).await, Err(MariaDbError::Closed)));

    let admin = MariaDbStore::open(&config, &cancel).await.unwrap();
    assert_eq!(admin.database(), name);
    drop_database(&admin).await;
}

#[test]
fn migration_history_is_stable() {
    assert_eq!(list_migrations(), vec!["wisp_type_column", "spec_id_column"]);
}
