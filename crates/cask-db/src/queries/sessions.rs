//! Pending signup/login session queries.
//!
//! Sessions are one-shot: `consume_*` only flips rows that are still
//! unconsumed, so a second caller observes [`DbError::NotFound`]. The sweep
//! hard-deletes expired and consumed rows.

use cask_types::session::{PendingLogin, PendingSignup};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::{conflict_on_constraint, parse_uuid, DbError, Result};

/// Insert a pending registration session.
pub fn create_signup(conn: &Connection, pending: &PendingSignup) -> Result<()> {
    conn.execute(
        "INSERT INTO pending_signups (session_id, login, salt_root, kdf_params, expires_at, consumed)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        rusqlite::params![
            pending.session_id.to_string(),
            pending.login,
            pending.salt_root,
            pending.kdf_params,
            pending.expires_at as i64,
        ],
    )
    .map_err(|e| conflict_on_constraint(e, "session_id"))?;
    Ok(())
}

/// Fetch a pending registration session.
pub fn get_signup(conn: &Connection, session_id: Uuid) -> Result<PendingSignup> {
    let row = conn
        .query_row(
            "SELECT session_id, login, salt_root, kdf_params, expires_at, consumed
             FROM pending_signups WHERE session_id = ?1",
            rusqlite::params![session_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or(DbError::NotFound)?;

    Ok(PendingSignup {
        session_id: parse_uuid(&row.0)?,
        login: row.1,
        salt_root: row.2,
        kdf_params: row.3,
        expires_at: row.4 as u64,
        consumed: row.5,
    })
}

/// Mark a registration session consumed. Exactly one caller can win.
pub fn consume_signup(conn: &Connection, session_id: Uuid) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pending_signups SET consumed = 1 WHERE session_id = ?1 AND consumed = 0",
        rusqlite::params![session_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Insert a pending login session.
pub fn create_login(conn: &Connection, pending: &PendingLogin) -> Result<()> {
    conn.execute(
        "INSERT INTO pending_logins (session_id, login, client_nonce, server_nonce, expires_at, consumed)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        rusqlite::params![
            pending.session_id.to_string(),
            pending.login,
            pending.client_nonce,
            pending.server_nonce,
            pending.expires_at as i64,
        ],
    )
    .map_err(|e| conflict_on_constraint(e, "session_id"))?;
    Ok(())
}

/// Fetch a pending login session.
pub fn get_login(conn: &Connection, session_id: Uuid) -> Result<PendingLogin> {
    let row = conn
        .query_row(
            "SELECT session_id, login, client_nonce, server_nonce, expires_at, consumed
             FROM pending_logins WHERE session_id = ?1",
            rusqlite::params![session_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or(DbError::NotFound)?;

    Ok(PendingLogin {
        session_id: parse_uuid(&row.0)?,
        login: row.1,
        client_nonce: row.2,
        server_nonce: row.3,
        expires_at: row.4 as u64,
        consumed: row.5,
    })
}

/// Mark a login session consumed. Exactly one caller can win.
pub fn consume_login(conn: &Connection, session_id: Uuid) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pending_logins SET consumed = 1 WHERE session_id = ?1 AND consumed = 0",
        rusqlite::params![session_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Hard-delete expired and consumed sessions from both tables. Returns the
/// number of rows removed.
pub fn sweep_expired(conn: &Connection, now: u64) -> Result<usize> {
    let signups = conn.execute(
        "DELETE FROM pending_signups WHERE expires_at < ?1 OR consumed = 1",
        rusqlite::params![now as i64],
    )?;
    let logins = conn.execute(
        "DELETE FROM pending_logins WHERE expires_at < ?1 OR consumed = 1",
        rusqlite::params![now as i64],
    )?;
    Ok(signups + logins)
}
