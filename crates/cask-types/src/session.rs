//! Ephemeral pending-session records for the two-roundtrip auth exchange.

use uuid::Uuid;

/// How long a started registration or login stays valid.
pub const PENDING_SESSION_TTL_SECS: u64 = 10 * 60;

/// Minimum accepted length for client and server nonces.
pub const MIN_NONCE_LEN: usize = 16;

/// A registration started but not yet completed.
///
/// One-shot: `consumed` transitions false to true exactly once. Expired and
/// consumed rows are hard-deleted by the background sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignup {
    pub session_id: Uuid,
    pub login: String,
    /// Root salt the server chose for this account.
    pub salt_root: Vec<u8>,
    /// Serialized KDF parameters as issued.
    pub kdf_params: Vec<u8>,
    pub expires_at: u64,
    pub consumed: bool,
}

/// A login started but not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub session_id: Uuid,
    pub login: String,
    pub client_nonce: Vec<u8>,
    pub server_nonce: Vec<u8>,
    pub expires_at: u64,
    pub consumed: bool,
}
