//! The SQLite handle.
//!
//! Every constructor brings the schema up to date before returning, so a
//! [`Database`] value always has the current tables.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/agora/agora.db`
    /// - macOS:   `~/Library/Application Support/com.agora.agora/agora.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\agora\agora\data\agora.db`
    pub fn new() -> Result<Self> {
        let db_path = default_path()?;
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL is ignored for in-memory databases, which is fine.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Raw connection, for queries the typed helpers do not cover.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory databases.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

/// Location used by [`Database::new`].
pub fn default_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "agora", "agora").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().join("agora.db"))
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

/// Current time at the precision timestamps are stored with, so a value
/// handed back to the caller equals the one read back later.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A write time strictly after `previous`, so two edits of one message
/// never share a timestamp.
pub(crate) fn now_after(previous: &DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > *previous {
        now
    } else {
        *previous + Duration::microseconds(1)
    }
}

/// Fixed-width RFC 3339 in UTC: lexical order is chronological order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

/// Map "no rows" to [`StoreError::NotFound`].
pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}
