//! Persistent refresh-token rows.

use uuid::Uuid;

/// Access token lifetime: 15 minutes.
pub const ACCESS_TTL_SECS: u64 = 15 * 60;

/// Refresh token lifetime: 30 days.
pub const REFRESH_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// One live (or retired) refresh credential.
///
/// Rows are kept after revocation so replayed tokens can be detected.
/// `rotated_from_jti` back-links the predecessor when the row was produced by
/// rotation; the chain is audit-only and never traversed at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    /// Unique string embedded in the issued token.
    pub jti: String,
    pub user_id: Uuid,
    /// SHA-256 of the issued refresh token string.
    pub token_hash: Vec<u8>,
    pub issued_at: u64,
    pub expires_at: u64,
    pub revoked_at: Option<u64>,
    pub rotated_from_jti: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl RefreshToken {
    /// Whether the row is currently usable.
    pub fn is_active(&self, now: u64) -> bool {
        self.revoked_at.is_none() && now <= self.expires_at
    }
}
