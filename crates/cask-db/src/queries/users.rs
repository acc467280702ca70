//! User account queries.

use cask_types::now_unix;
use cask_types::user::User;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::{conflict_on_constraint, parse_uuid, DbError, Result};

/// Insert a new user and return the stored copy with server-assigned
/// timestamps. A duplicate live login surfaces as [`DbError::Conflict`].
pub fn create(conn: &Connection, user: &User) -> Result<User> {
    let now = now_unix();
    conn.execute(
        "INSERT INTO users (id, login, stored_key, server_key, salt_root, kdf_params,
                            created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
        rusqlite::params![
            user.id.to_string(),
            user.login,
            user.stored_key,
            user.server_key,
            user.salt_root,
            user.kdf_params,
            now as i64,
            now as i64,
        ],
    )
    .map_err(|e| conflict_on_constraint(e, "login"))?;

    let mut saved = user.clone();
    saved.created_at = now;
    saved.updated_at = now;
    saved.deleted_at = None;
    Ok(saved)
}

/// Fetch a non-deleted user by login handle.
pub fn get_by_login(conn: &Connection, login: &str) -> Result<User> {
    get_where(conn, "login = ?1", rusqlite::params![login])
}

/// Fetch a non-deleted user by id.
pub fn get_by_id(conn: &Connection, id: Uuid) -> Result<User> {
    get_where(conn, "id = ?1", rusqlite::params![id.to_string()])
}

fn get_where(conn: &Connection, cond: &str, params: &[&dyn rusqlite::ToSql]) -> Result<User> {
    let sql = format!(
        "SELECT id, login, stored_key, server_key, salt_root, kdf_params,
                created_at, updated_at, deleted_at
         FROM users WHERE {cond} AND deleted_at IS NULL"
    );
    let row = conn
        .query_row(&sql, params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, Vec<u8>>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<i64>>(8)?,
            ))
        })
        .optional()?
        .ok_or(DbError::NotFound)?;

    Ok(User {
        id: parse_uuid(&row.0)?,
        login: row.1,
        stored_key: row.2,
        server_key: row.3,
        salt_root: row.4,
        kdf_params: row.5,
        created_at: row.6 as u64,
        updated_at: row.7 as u64,
        deleted_at: row.8.map(|t| t as u64),
    })
}
