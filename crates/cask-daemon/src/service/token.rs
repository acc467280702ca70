//! Token lifecycle: issuance, rotation, revocation, replay detection.

use cask_crypto::{ct_eq, sha256};
use cask_db::queries::refresh_tokens;
use cask_token::TokenManager;
use cask_types::now_unix;
use cask_types::token::{RefreshToken, REFRESH_TTL_SECS};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::service::{Result, ServiceError};
use crate::Db;

/// Owns the refresh-token table; composes the stateless manager with
/// persistence. Rotation of one jti is serialized by the conditional revoke:
/// of two concurrent refreshes of the same token, exactly one wins.
pub struct TokenService {
    db: Db,
    manager: TokenManager,
}

impl TokenService {
    pub fn new(db: Db, manager: TokenManager) -> Self {
        Self { db, manager }
    }

    /// Issue a fresh access/refresh pair for a user.
    pub async fn issue(&self, user_id: Uuid) -> Result<(String, String)> {
        let conn = self.db.lock().await;
        self.issue_locked(&conn, user_id, None)
    }

    /// Rotate a presented refresh token into a new pair.
    ///
    /// The presented token must parse, its row must be unrevoked and
    /// unexpired, and its hash must match what was stored at issuance. The
    /// old row is revoked before the successor is persisted.
    pub async fn refresh(&self, presented: &str) -> Result<(String, String)> {
        let (user_id, jti) = self.manager.parse_refresh(presented)?;

        let conn = self.db.lock().await;
        let row = refresh_tokens::get_by_jti(&conn, &jti)?;
        let presented_hash = sha256(presented.as_bytes());
        let now = now_unix();

        if row.revoked_at.is_some() {
            // Replay of a rotated token. When the hash still matches, this
            // is the genuine credential being reused: revoke the family.
            if ct_eq(&presented_hash, &row.token_hash) {
                let revoked = refresh_tokens::revoke_all_for_user(&conn, row.user_id, now)?;
                warn!(
                    user_id = %row.user_id,
                    jti = %jti,
                    revoked,
                    "Refresh token reuse detected; revoked all active tokens for user"
                );
            }
            return Err(ServiceError::TokenRevoked);
        }
        if now > row.expires_at {
            return Err(ServiceError::TokenExpired);
        }
        if !ct_eq(&presented_hash, &row.token_hash) {
            return Err(ServiceError::TokenMismatch);
        }

        // Conditional revoke: zero affected rows means a concurrent refresh
        // already spent this token.
        if !refresh_tokens::revoke(&conn, &jti, now)? {
            return Err(ServiceError::TokenRevoked);
        }

        let pair = self.issue_locked(&conn, user_id, Some(jti.clone()))?;
        debug!(user_id = %user_id, rotated_from = %jti, "Refresh token rotated");
        Ok(pair)
    }

    /// Revoke the row behind a presented refresh token.
    pub async fn revoke(&self, presented: &str) -> Result<()> {
        let (_, jti) = self.manager.parse_refresh(presented)?;
        let conn = self.db.lock().await;
        refresh_tokens::revoke(&conn, &jti, now_unix())?;
        Ok(())
    }

    /// Revoke every active token for a user.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<()> {
        let conn = self.db.lock().await;
        refresh_tokens::revoke_all_for_user(&conn, user_id, now_unix())?;
        Ok(())
    }

    /// Resolve the user behind an access token. Used by the request demux.
    pub fn authenticate(&self, access_token: &str) -> Result<Uuid> {
        Ok(self.manager.parse_access(access_token)?)
    }

    fn issue_locked(
        &self,
        conn: &rusqlite::Connection,
        user_id: Uuid,
        rotated_from_jti: Option<String>,
    ) -> Result<(String, String)> {
        let access = self.manager.mint_access(user_id);
        let (refresh, jti) = self.manager.mint_refresh(user_id);

        let now = now_unix();
        let row = RefreshToken {
            id: Uuid::new_v4(),
            jti,
            user_id,
            token_hash: sha256(refresh.as_bytes()).to_vec(),
            issued_at: now,
            expires_at: now + REFRESH_TTL_SECS,
            revoked_at: None,
            rotated_from_jti,
            created_at: now,
            updated_at: now,
        };
        refresh_tokens::create(conn, &row)?;

        Ok((access, refresh))
    }
}
