//! SQLite-backed filing store and directories.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers proceed while a writer commits
//! - `busy_timeout` (5s unless configured) before a locked write gives up
//! - `foreign_keys = ON` so filings always reference known clients and CAs

pub mod directory;
pub mod filings;
pub mod migrations;
pub mod schema;

use crate::store::StoreError;
use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode as SqliteCode, ffi};
use std::{path::Path, time::Duration};

/// Busy timeout used for store connections when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store database, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store database {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// A filing store, client directory and professional directory sharing one
/// SQLite connection.
///
/// The type is `Send` but not `Sync`; concurrent callers each open their own
/// store on the same database file.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at `path` with the default busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open the store at `path` with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        Ok(Self {
            conn: open_database(path, busy_timeout)?,
        })
    }

    /// A private, migrated in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Classify a SQLite failure into the store error taxonomy.
pub(crate) fn map_sqlite_error(err: rusqlite::Error, what: &str) -> StoreError {
    let failure = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some((failure.code, failure.extended_code)),
        _ => None,
    };

    match failure {
        Some((SqliteCode::ConstraintViolation, extended))
            if extended == ffi::SQLITE_CONSTRAINT_UNIQUE
                || extended == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict(format!("{what}: {err}"))
        }
        Some((
            SqliteCode::DatabaseBusy
            | SqliteCode::DatabaseLocked
            | SqliteCode::CannotOpen
            | SqliteCode::SystemIoFailure
            | SqliteCode::OperationInterrupted,
            _,
        )) => StoreError::Unavailable(format!("{what}: {err}")),
        _ => StoreError::Internal(anyhow::Error::new(err).context(what.to_string())),
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
