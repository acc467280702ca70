//! Refresh-token row queries.

use cask_types::now_unix;
use cask_types::token::RefreshToken;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::{conflict_on_constraint, parse_uuid, DbError, Result};

/// Insert a refresh-token row. A duplicate jti surfaces as
/// [`DbError::Conflict`].
pub fn create(conn: &Connection, token: &RefreshToken) -> Result<RefreshToken> {
    let now = now_unix();
    conn.execute(
        "INSERT INTO refresh_tokens (id, jti, user_id, token_hash, issued_at, expires_at,
                                     revoked_at, rotated_from_jti, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?8)",
        rusqlite::params![
            token.id.to_string(),
            token.jti,
            token.user_id.to_string(),
            token.token_hash,
            token.issued_at as i64,
            token.expires_at as i64,
            token.rotated_from_jti,
            now as i64,
        ],
    )
    .map_err(|e| conflict_on_constraint(e, "jti"))?;

    let mut saved = token.clone();
    saved.revoked_at = None;
    saved.created_at = now;
    saved.updated_at = now;
    Ok(saved)
}

/// Fetch a refresh-token row by jti.
pub fn get_by_jti(conn: &Connection, jti: &str) -> Result<RefreshToken> {
    let row = conn
        .query_row(
            "SELECT id, jti, user_id, token_hash, issued_at, expires_at,
                    revoked_at, rotated_from_jti, created_at, updated_at
             FROM refresh_tokens WHERE jti = ?1",
            rusqlite::params![jti],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, i64>(9)?,
                ))
            },
        )
        .optional()?
        .ok_or(DbError::NotFound)?;

    Ok(RefreshToken {
        id: parse_uuid(&row.0)?,
        jti: row.1,
        user_id: parse_uuid(&row.2)?,
        token_hash: row.3,
        issued_at: row.4 as u64,
        expires_at: row.5 as u64,
        revoked_at: row.6.map(|t| t as u64),
        rotated_from_jti: row.7,
        created_at: row.8 as u64,
        updated_at: row.9 as u64,
    })
}

/// Revoke one token, but only if it is still unrevoked. Returns whether this
/// caller performed the revocation; `false` means another caller already did,
/// which rotation treats as the token being spent.
pub fn revoke(conn: &Connection, jti: &str, now: u64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE refresh_tokens SET revoked_at = ?1, updated_at = ?1
         WHERE jti = ?2 AND revoked_at IS NULL",
        rusqlite::params![now as i64, jti],
    )?;
    Ok(changed > 0)
}

/// Revoke every active token for a user. Returns the number revoked.
pub fn revoke_all_for_user(conn: &Connection, user_id: Uuid, now: u64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE refresh_tokens SET revoked_at = ?1, updated_at = ?1
         WHERE user_id = ?2 AND revoked_at IS NULL",
        rusqlite::params![now as i64, user_id.to_string()],
    )?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(user_id: Uuid) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            jti: Uuid::new_v4().to_string(),
            user_id,
            token_hash: vec![7u8; 32],
            issued_at: 1000,
            expires_at: 100_000,
            revoked_at: None,
            rotated_from_jti: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_create_and_get() {
        let conn = crate::open_memory().expect("open");
        let t = token(Uuid::new_v4());
        create(&conn, &t).expect("create");

        let loaded = get_by_jti(&conn, &t.jti).expect("get");
        assert_eq!(loaded.user_id, t.user_id);
        assert_eq!(loaded.token_hash, t.token_hash);
        assert_eq!(loaded.revoked_at, None);
    }

    #[test]
    fn test_duplicate_jti_conflicts() {
        let conn = crate::open_memory().expect("open");
        let t = token(Uuid::new_v4());
        create(&conn, &t).expect("first");

        let mut dup = token(t.user_id);
        dup.jti = t.jti.clone();
        assert!(matches!(
            create(&conn, &dup),
            Err(DbError::Conflict(_))
        ));
    }

    #[test]
    fn test_revoke_is_conditional() {
        let conn = crate::open_memory().expect("open");
        let t = token(Uuid::new_v4());
        create(&conn, &t).expect("create");

        assert!(revoke(&conn, &t.jti, 2000).expect("first revoke"));
        assert!(!revoke(&conn, &t.jti, 3000).expect("second revoke loses"));

        let loaded = get_by_jti(&conn, &t.jti).expect("get");
        assert_eq!(loaded.revoked_at, Some(2000));
    }

    #[test]
    fn test_revoke_missing_jti_is_false() {
        let conn = crate::open_memory().expect("open");
        assert!(!revoke(&conn, "no-such-jti", 1000).expect("revoke"));
    }

    #[test]
    fn test_revoke_all_for_user() {
        let conn = crate::open_memory().expect("open");
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = token(user);
        let b = token(user);
        let c = token(other);
        create(&conn, &a).expect("a");
        create(&conn, &b).expect("b");
        create(&conn, &c).expect("c");
        revoke(&conn, &a.jti, 1500).expect("pre-revoke one");

        let revoked = revoke_all_for_user(&conn, user, 2000).expect("revoke all");
        assert_eq!(revoked, 1); // only b was still active

        assert_eq!(get_by_jti(&conn, &a.jti).expect("a").revoked_at, Some(1500));
        assert_eq!(get_by_jti(&conn, &b.jti).expect("b").revoked_at, Some(2000));
        assert_eq!(get_by_jti(&conn, &c.jti).expect("c").revoked_at, None);
    }

    #[test]
    fn test_rotated_from_link_persists() {
        let conn = crate::open_memory().expect("open");
        let old = token(Uuid::new_v4());
        create(&conn, &old).expect("old");

        let mut successor = token(old.user_id);
        successor.rotated_from_jti = Some(old.jti.clone());
        create(&conn, &successor).expect("successor");

        let loaded = get_by_jti(&conn, &successor.jti).expect("get");
        assert_eq!(loaded.rotated_from_jti.as_deref(), Some(old.jti.as_str()));
    }
}
