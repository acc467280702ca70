//! Encrypted records and their sync views.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted byte length for a record name.
pub const MAX_NAME_LEN: usize = 255;

/// Kind of secret a record holds. The server treats the payload identically
/// for every kind; the discriminator exists for client-side filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Login,
    Note,
    Card,
    /// Large payload streamed through the blob store.
    Binary,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Login => "login",
            RecordType::Note => "note",
            RecordType::Card => "card",
            RecordType::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "login" => Some(RecordType::Login),
            "note" => Some(RecordType::Note),
            "card" => Some(RecordType::Card),
            "binary" => Some(RecordType::Binary),
            _ => None,
        }
    }
}

/// A stored record.
///
/// Exactly one of `encrypted_data` (small records, inline) or `blob_key`
/// (streamed records) is set. `encrypted_key` is the per-record data key
/// wrapped under the user's master key; the server cannot unwrap it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub encrypted_data: Option<Vec<u8>>,
    /// Object key in the blob store, `user-<uuid>/record-<uuid>/file-<uuid>`.
    pub blob_key: Option<String>,
    pub encrypted_key: Vec<u8>,
    /// Free-form cipher label chosen by the client.
    pub algorithm: String,
    pub record_type: RecordType,
    /// Ciphertext bytes per chunk for streamed records; 0 for inline records.
    pub encrypted_chunk_size: u32,
    /// Client-chosen idempotency key, unique per owner when present.
    pub request_id: Option<Uuid>,
    pub created_at: u64,
    pub updated_at: u64,
    pub deleted_at: Option<u64>,
}

/// A deleted record as reported in deltas so clients can garbage-collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    pub id: Uuid,
    pub deleted_at: u64,
}

/// Parameters for creating a small (inline) record.
#[derive(Debug, Clone)]
pub struct CreateRecordParams {
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub encrypted_data: Vec<u8>,
    pub encrypted_key: Vec<u8>,
    pub algorithm: String,
    pub record_type: RecordType,
    pub request_id: Option<Uuid>,
}

/// Metadata describing a record to be created through the upload stream.
///
/// Binary payload fields travel base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Base64 of the wrapped per-record key.
    pub encrypted_key: String,
    pub algorithm: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Ciphertext bytes per chunk; required >= 1 for binary records.
    #[serde(default)]
    pub chunk_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

/// Record metadata as sent back to clients (no payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Base64 of the wrapped per-record key.
    pub encrypted_key: String,
    pub algorithm: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default)]
    pub chunk_size: u32,
    pub created_at: u64,
    pub updated_at: u64,
}
