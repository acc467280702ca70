//! SQL schema definitions.

/// Complete schema for the Cask database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Accounts
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    login TEXT NOT NULL,
    stored_key BLOB NOT NULL,
    server_key BLOB NOT NULL,
    salt_root BLOB NOT NULL,
    kdf_params BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_login ON users(login) WHERE deleted_at IS NULL;

-- ============================================================
-- Pending auth sessions (hard-deleted by the sweep)
-- ============================================================

CREATE TABLE IF NOT EXISTS pending_signups (
    session_id TEXT PRIMARY KEY,
    login TEXT NOT NULL,
    salt_root BLOB NOT NULL,
    kdf_params BLOB NOT NULL,
    expires_at INTEGER NOT NULL,
    consumed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_signups_expires ON pending_signups(expires_at);

CREATE TABLE IF NOT EXISTS pending_logins (
    session_id TEXT PRIMARY KEY,
    login TEXT NOT NULL,
    client_nonce BLOB NOT NULL,
    server_nonce BLOB NOT NULL,
    expires_at INTEGER NOT NULL,
    consumed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_logins_expires ON pending_logins(expires_at);

-- ============================================================
-- Refresh tokens (kept after revocation for reuse detection)
-- ============================================================

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id TEXT PRIMARY KEY,
    jti TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    token_hash BLOB NOT NULL,
    issued_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    revoked_at INTEGER,
    rotated_from_jti TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user_active
    ON refresh_tokens(user_id) WHERE revoked_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_active
    ON refresh_tokens(expires_at) WHERE revoked_at IS NULL;

-- ============================================================
-- Records (soft-deleted; deleted rows serve delta tombstones)
-- ============================================================

CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    encrypted_data BLOB,
    blob_key TEXT,
    encrypted_key BLOB NOT NULL,
    algorithm TEXT NOT NULL,
    type TEXT NOT NULL,
    encrypted_chunk_size INTEGER NOT NULL DEFAULT 0,
    request_id TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_records_owner ON records(owner_id);
CREATE INDEX IF NOT EXISTS idx_records_owner_type ON records(owner_id, type);
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_owner_request
    ON records(owner_id, request_id) WHERE request_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_records_live ON records(owner_id) WHERE deleted_at IS NULL;
"#;
