//! User accounts and their authentication verifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Expected byte length of `stored_key` and `server_key`.
pub const VERIFIER_LEN: usize = 32;

/// A registered account.
///
/// The server never sees the passphrase; it stores only the two verifiers
/// derived by the client during registration. `kdf_params` is kept as the
/// serialized form issued at registration and echoed back verbatim on login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// Login handle. Unique among non-deleted users, case-sensitive.
    pub login: String,
    /// `SHA-256(client_key)` — proves knowledge of the passphrase.
    pub stored_key: Vec<u8>,
    /// HMAC key for the server signature returned on successful login.
    pub server_key: Vec<u8>,
    /// Per-user root salt chosen by the server at registration.
    pub salt_root: Vec<u8>,
    /// Serialized [`KdfParams`], exactly as issued.
    pub kdf_params: Vec<u8>,
    pub created_at: u64,
    pub updated_at: u64,
    pub deleted_at: Option<u64>,
}

/// Client-side KDF cost parameters.
///
/// The server only stores and echoes these; the KDF runs on clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Iteration count.
    pub time: u32,
    /// Memory cost in KiB.
    pub mem_kib: u32,
    /// Parallelism lanes.
    pub parallelism: u8,
}

impl KdfParams {
    /// Serialize for storage on the user row.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("kdf params serialize")
    }

    /// Parse the stored form back.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}
