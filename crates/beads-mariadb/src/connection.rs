//! Connection establishment.
//!
//! Opening a store goes through [`establish`]:
//!
//! 1. build a lazy pool for the target database (nothing is dialled yet),
//! 2. dial a one-off administrative connection with no database selected
//!    and `CREATE DATABASE IF NOT EXISTS`,
//! 3. ping the pool.
//!
//! Any failure closes the pool before returning, so callers never receive a
//! handle that has not answered a ping.

use std::io;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, MySql};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify;
use crate::config::ConnectionParams;
use crate::error::{MariaDbError, MariaDbResult};

/// Establish a live, pinged pool for `params`, creating the database if it
/// does not exist yet.
pub async fn establish(
    params: &ConnectionParams,
    cancel: &CancellationToken,
) -> MariaDbResult<MySqlPool> {
    info!(
        server = %params.redacted_target(),
        max_open = params.pool.max_open,
        "connecting to MariaDB server"
    );

    let pool = open_pool(params);

    let setup = async {
        ensure_database(params).await?;
        ping(&pool).await
    };
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MariaDbError::Cancelled),
        result = setup => result,
    };

    if let Err(err) = result {
        warn!(error = %err, "connection setup failed, closing pool");
        pool.close().await;
        return Err(err);
    }

    info!(database = %params.database, "connected to MariaDB server");
    Ok(pool)
}

/// Connect options for the server, optionally selecting a database.
fn connect_options(params: &ConnectionParams, database: Option<&str>) -> MySqlConnectOptions {
    let mut opts = MySqlConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .username(&params.user);
    if let Some(password) = &params.password {
        opts = opts.password(password);
    }
    if let Some(database) = database {
        opts = opts.database(database);
    }
    opts
}

/// Build the pool without dialling the server.
fn open_pool(params: &ConnectionParams) -> MySqlPool {
    let settings = &params.pool;
    MySqlPoolOptions::new()
        .max_connections(settings.max_open)
        .min_connections(0)
        .max_lifetime(settings.max_lifetime)
        .idle_timeout(settings.idle_timeout)
        .acquire_timeout(settings.acquire_timeout)
        .connect_lazy_with(connect_options(params, Some(&params.database)))
}

/// Create the target database through a short-lived connection that has no
/// database selected. The connection is closed on every path.
async fn ensure_database(params: &ConnectionParams) -> MariaDbResult<()> {
    let mut admin = MySqlConnection::connect_with(&connect_options(params, None))
        .await
        .map_err(|err| setup_failure(params, err))?;

    let stmt = format!("CREATE DATABASE IF NOT EXISTS `{}`", params.database);
    let result = admin.execute(stmt.as_str()).await;

    if let Err(err) = admin.close().await {
        debug!(error = %err, "closing administrative connection failed");
    }

    match result {
        Ok(_) => {
            debug!(database = %params.database, "database ensured");
            Ok(())
        }
        Err(err) if classify::is_database_exists(&err) => {
            debug!(database = %params.database, "database already exists");
            Ok(())
        }
        Err(err) => Err(setup_failure(params, err)),
    }
}

/// Turn an administrative-connection failure into an actionable error.
fn setup_failure(params: &ConnectionParams, err: sqlx::Error) -> MariaDbError {
    if classify::is_connection_refused(&err) {
        MariaDbError::Unreachable {
            host: params.host.clone(),
            port: params.port,
            source: err,
        }
    } else {
        MariaDbError::CreateDatabase {
            database: params.database.clone(),
            source: err,
        }
    }
}

/// Acquire a pooled connection and ping it.
pub(crate) async fn ping(pool: &MySqlPool) -> MariaDbResult<()> {
    let mut conn = pool.acquire().await.map_err(MariaDbError::Ping)?;
    conn.ping().await.map_err(MariaDbError::Ping)
}

/// Check out a connection, failing fast when the server refuses new ones.
///
/// The pool retries a refused dial internally until its acquire timeout, so
/// when it would have to open a connection we first make a bare TCP connect.
/// A refusal there is returned as-is; any other dial error is left for the
/// pool to report.
pub(crate) async fn checkout(
    pool: &MySqlPool,
    host: &str,
    port: u16,
) -> Result<PoolConnection<MySql>, sqlx::Error> {
    if let Some(conn) = pool.try_acquire() {
        return Ok(conn);
    }
    if pool.num_idle() == 0 && pool.size() < pool.options().get_max_connections() {
        if let Err(err) = TcpStream::connect((host, port)).await {
            if err.kind() == io::ErrorKind::ConnectionRefused {
                debug!(host, port, "server refused connection");
                return Err(sqlx::Error::Io(err));
            }
        }
    }
    pool.acquire().await
}
