//! # cask-db
//!
//! Persistence layer for the Cask daemon: one SQLite database holding users,
//! pending auth sessions, refresh tokens, and record metadata.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are UTC unix seconds (INTEGER)
//! - UUIDs are canonical lowercase TEXT
//! - Schema version stored in `PRAGMA user_version`
//!
//! Query modules operate at the level of domain entities, never raw rows:
//! callers hand in an entity, get back a fresh copy with server-assigned
//! fields filled, and distinguish [`DbError::NotFound`] and
//! [`DbError::Conflict`] from backend failure.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The requested row does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint was violated; the payload names the field.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("stored value malformed: {0}")]
    Corrupt(String),

    /// Any other SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

/// Translate a constraint violation into [`DbError::Conflict`], passing every
/// other failure through.
pub(crate) fn conflict_on_constraint(err: rusqlite::Error, what: &str) -> DbError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict(what.to_string())
        }
        other => DbError::Sqlite(other),
    }
}

/// Parse a stored UUID column.
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| DbError::Corrupt(format!("invalid uuid {s:?}")))
}
