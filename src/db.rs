//! Database connection management, migrations, and error types.
//!
//! This module handles all SQLite connection setup (WAL mode, foreign keys,
//! busy timeout), schema versioning via embedded migrations, and the error
//! type shared by the whole crate.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Central error type for pagekit.
///
/// Storage failures are carried through unchanged so callers see the
/// underlying constraint or I/O problem.
#[derive(Debug, Error)]
pub enum PageKitError {
    /// Database operation failed (including constraint violations).
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// I/O operation failed (directory creation, reading stdin, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Returns the path to the SQLite database file.
///
/// Resolution order:
/// 1. `PAGEKIT_DB` environment variable (if set)
/// 2. `~/.pagekit/pagekit.db` (default)
///
/// Creates the parent directory if it doesn't exist.
///
/// # Errors
///
/// Returns `PageKitError::Io` if the home directory cannot be determined or
/// the parent directory cannot be created.
pub fn db_path() -> Result<PathBuf, PageKitError> {
    let path = if let Ok(custom) = std::env::var("PAGEKIT_DB") {
        PathBuf::from(custom)
    } else {
        let home = dirs::home_dir().ok_or_else(|| {
            PageKitError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine home directory",
            ))
        })?;
        home.join(".pagekit").join("pagekit.db")
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(path)
}

/// Opens a connection to the configured database. See [`open_connection_at`].
pub fn open_connection() -> Result<Connection, PageKitError> {
    let path = db_path()?;
    open_connection_at(&path)
}

/// Opens a SQLite connection at the specified path with proper settings.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **Foreign keys**: label, project and page references are enforced
/// - **Busy timeout**: 5 seconds of write contention before giving up
pub fn open_connection_at(path: &Path) -> Result<Connection, PageKitError> {
    let conn = Connection::open(path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    debug!(path = %path.display(), "opened database");
    Ok(conn)
}

/// Embedded migrations, in order. Each file bumps `schema_meta.version`.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../migrations/001_initial.sql")),
    (2, include_str!("../migrations/002_page_logs.sql")),
];

/// Latest schema version known to this build.
pub const SCHEMA_VERSION: i64 = 2;

/// Runs all pending database migrations.
///
/// The current version is read from `schema_meta` (0 when the table doesn't
/// exist yet). Every migration above it runs in its own transaction, so a
/// failing migration leaves the previous version in place.
pub fn run_migrations(conn: &mut Connection) -> Result<(), PageKitError> {
    let current_version: i64 = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    for (target_version, sql) in MIGRATIONS {
        if *target_version > current_version {
            debug!(version = target_version, "applying migration");
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.commit()?;
        }
    }

    Ok(())
}

/// Opens an in-memory database with foreign keys on and all migrations applied.
#[cfg(test)]
pub(crate) fn test_connection() -> Connection {
    let mut conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
    conn.pragma_update(None, "foreign_keys", "ON")
        .expect("Failed to enable foreign keys");
    run_migrations(&mut conn).expect("Migrations should succeed");
    conn
}
