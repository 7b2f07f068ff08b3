//! Error classification.
//!
//! Every decision of the form "is this failure transient?" or "is this DDL
//! failure actually a no-op?" goes through this module. Structured signals
//! are checked first (I/O error kinds, MySQL error numbers); message
//! substrings are the fallback, because driver and server versions word
//! things differently.

use std::io::ErrorKind;

use sqlx::mysql::MySqlDatabaseError;

use crate::error::MariaDbError;

// MySQL / MariaDB server error numbers.
const ER_DB_CREATE_EXISTS: u16 = 1007;
const ER_TABLE_EXISTS: u16 = 1050;
const ER_DUP_FIELDNAME: u16 = 1060;
const ER_DUP_KEYNAME: u16 = 1061;
const ER_CANT_DROP_FIELD_OR_KEY: u16 = 1091;

const RETRYABLE_MESSAGES: &[&str] = &[
    "bad connection",
    "invalid connection",
    "broken pipe",
    "connection reset",
];

/// The server-side error number, when `err` came from the server.
pub fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(MySqlDatabaseError::number),
        _ => None,
    }
}

fn io_kind(err: &sqlx::Error) -> Option<ErrorKind> {
    match err {
        sqlx::Error::Io(io) => Some(io.kind()),
        _ => None,
    }
}

fn message_contains_any(err: &sqlx::Error, needles: &[&str]) -> bool {
    let msg = err.to_string().to_lowercase();
    needles.iter().any(|needle| msg.contains(needle))
}

// ---------------------------------------------------------------------------
// Transient vs. permanent
// ---------------------------------------------------------------------------

/// Whether a failed operation is worth retrying.
///
/// Broken or reset connections (including a stale pooled connection the
/// server already dropped) are transient. Everything else is permanent,
/// including a refused connection.
pub fn is_retryable(err: &sqlx::Error) -> bool {
    match io_kind(err) {
        Some(
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof,
        ) => true,
        Some(ErrorKind::ConnectionRefused) => false,
        _ => is_retryable_message(&err.to_string()),
    }
}

/// Message-only form of [`is_retryable`], for errors that have already been
/// flattened to text.
pub fn is_retryable_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    RETRYABLE_MESSAGES.iter().any(|needle| msg.contains(needle))
}

/// Whether the server refused the TCP connection outright.
pub fn is_connection_refused(err: &sqlx::Error) -> bool {
    io_kind(err) == Some(ErrorKind::ConnectionRefused)
        || message_contains_any(err, &["connection refused"])
}

impl MariaDbError {
    /// Whether this error is transient and the operation may be re-issued.
    pub fn is_retryable(&self) -> bool {
        self.sqlx().is_some_and(is_retryable)
    }
}

// ---------------------------------------------------------------------------
// Idempotent DDL outcomes
// ---------------------------------------------------------------------------

/// `CREATE DATABASE` hit an existing database (MariaDB can report this even
/// with `IF NOT EXISTS`).
pub fn is_database_exists(err: &sqlx::Error) -> bool {
    mysql_error_number(err) == Some(ER_DB_CREATE_EXISTS)
        || message_contains_any(err, &["database exists", "1007"])
}

/// An index, column, or table being created is already there.
pub fn is_duplicate(err: &sqlx::Error) -> bool {
    matches!(
        mysql_error_number(err),
        Some(ER_DUP_KEYNAME | ER_DUP_FIELDNAME | ER_TABLE_EXISTS)
    ) || message_contains_any(err, &["duplicate", "already exists"])
}

/// `ADD COLUMN` hit an existing column.
pub fn is_duplicate_column(err: &sqlx::Error) -> bool {
    mysql_error_number(err) == Some(ER_DUP_FIELDNAME)
        || message_contains_any(err, &["duplicate column"])
}

/// A `DROP` targeted a constraint or key that is not there.
pub fn is_missing_constraint(err: &sqlx::Error) -> bool {
    mysql_error_number(err) == Some(ER_CANT_DROP_FIELD_OR_KEY)
        || message_contains_any(
            err,
            &[
                "can't drop",
                "doesn't exist",
                "check that it exists",
                "was not found",
            ],
        )
}
