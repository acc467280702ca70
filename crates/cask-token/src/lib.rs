//! # cask-token
//!
//! Stateless mint/parse for the two bearer token classes, signed with
//! HMAC-SHA256 under one shared secret.
//!
//! ## Token format
//!
//! Tokens are composed of:
//! - 1 byte: format version (0x01)
//! - 1 byte: token type (0x01 access, 0x02 refresh)
//! - 16 bytes: user id
//! - 8 bytes: issued-at (unix seconds, big-endian)
//! - 8 bytes: expires-at (unix seconds, big-endian)
//! - 16 bytes: jti (refresh tokens only)
//! - 32 bytes: HMAC-SHA256 over everything above
//!
//! 66 bytes for access tokens, 82 for refresh, URL-safe base64 on the wire.
//! Expiry is checked at parse time with zero leeway; any failure (length,
//! MAC, type, version, expiry) collapses to [`TokenError::Invalid`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cask_crypto::{hmac_sha256, mac::hmac_sha256_verify};
use cask_types::now_unix;
use cask_types::token::{ACCESS_TTL_SECS, REFRESH_TTL_SECS};
use uuid::Uuid;

const VERSION: u8 = 0x01;
const TYPE_ACCESS: u8 = 0x01;
const TYPE_REFRESH: u8 = 0x02;

const MAC_LEN: usize = 32;
const ACCESS_BODY_LEN: usize = 1 + 1 + 16 + 8 + 8;
const REFRESH_BODY_LEN: usize = ACCESS_BODY_LEN + 16;

/// Error types for token operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token failed to verify for any reason.
    #[error("invalid token")]
    Invalid,
}

pub type Result<T> = std::result::Result<T, TokenError>;

/// Signs and verifies both token classes with one symmetric secret.
#[derive(Clone)]
pub struct TokenManager {
    secret: Vec<u8>,
}

impl TokenManager {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mint a short-lived access token.
    pub fn mint_access(&self, user_id: Uuid) -> String {
        self.mint(TYPE_ACCESS, user_id, None, now_unix())
    }

    /// Mint a long-lived refresh token; returns the token and its jti.
    pub fn mint_refresh(&self, user_id: Uuid) -> (String, String) {
        let jti = Uuid::new_v4();
        let token = self.mint(TYPE_REFRESH, user_id, Some(jti), now_unix());
        (token, jti.to_string())
    }

    /// Verify an access token and return the enclosed user id.
    pub fn parse_access(&self, token: &str) -> Result<Uuid> {
        let (user_id, _) = self.parse(TYPE_ACCESS, token, now_unix())?;
        Ok(user_id)
    }

    /// Verify a refresh token and return the enclosed user id and jti.
    pub fn parse_refresh(&self, token: &str) -> Result<(Uuid, String)> {
        let (user_id, jti) = self.parse(TYPE_REFRESH, token, now_unix())?;
        Ok((user_id, jti.expect("refresh token carries jti").to_string()))
    }

    fn mint(&self, token_type: u8, user_id: Uuid, jti: Option<Uuid>, now: u64) -> String {
        let ttl = match token_type {
            TYPE_ACCESS => ACCESS_TTL_SECS,
            _ => REFRESH_TTL_SECS,
        };

        let mut body = Vec::with_capacity(REFRESH_BODY_LEN + MAC_LEN);
        body.push(VERSION);
        body.push(token_type);
        body.extend_from_slice(user_id.as_bytes());
        body.extend_from_slice(&now.to_be_bytes());
        body.extend_from_slice(&(now + ttl).to_be_bytes());
        if let Some(jti) = jti {
            body.extend_from_slice(jti.as_bytes());
        }

        let mac = hmac_sha256(&self.secret, &body);
        body.extend_from_slice(&mac);
        URL_SAFE_NO_PAD.encode(body)
    }

    fn parse(&self, expect_type: u8, token: &str, now: u64) -> Result<(Uuid, Option<Uuid>)> {
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| TokenError::Invalid)?;

        let body_len = match expect_type {
            TYPE_ACCESS => ACCESS_BODY_LEN,
            _ => REFRESH_BODY_LEN,
        };
        if raw.len() != body_len + MAC_LEN {
            return Err(TokenError::Invalid);
        }

        let (body, mac) = raw.split_at(body_len);
        if !hmac_sha256_verify(&self.secret, body, mac) {
            return Err(TokenError::Invalid);
        }
        if body[0] != VERSION || body[1] != expect_type {
            return Err(TokenError::Invalid);
        }

        let user_id = Uuid::from_slice(&body[2..18]).map_err(|_| TokenError::Invalid)?;
        let expires_at = u64::from_be_bytes(body[26..34].try_into().expect("fixed slice"));
        if now > expires_at {
            return Err(TokenError::Invalid);
        }

        let jti = if expect_type == TYPE_REFRESH {
            Some(Uuid::from_slice(&body[34..50]).map_err(|_| TokenError::Invalid)?)
        } else {
            None
        };

        Ok((user_id, jti))
    }
}
