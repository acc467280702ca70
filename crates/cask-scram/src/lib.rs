//! # cask-scram
//!
//! SCRAM-style two-roundtrip authentication engine.
//!
//! The server never sees a passphrase. At registration it stores two
//! client-derived verifiers: `stored_key = SHA-256(client_key)` and
//! `server_key = HMAC(salted, "Server Key")`. At login it verifies a proof of
//! knowledge of `client_key` against `stored_key` and answers with a
//! signature under `server_key` so the client can authenticate the server in
//! return.
//!
//! ## Modules
//!
//! - [`server`] — registration and login verification driven by pending
//!   session records
//! - [`client`] — key derivation and proof construction as clients perform
//!   them (used by tests and reference clients)
//! - [`message`] — the canonical auth-message encoding both sides MAC over

pub mod client;
pub mod message;
pub mod server;

pub use server::{LoginClaim, LoginOffer, RegistrationClaim, RegistrationOffer};

/// Error types for the authentication exchange.
///
/// Variants are deliberately coarse; at the wire every one of them surfaces
/// as an unauthenticated error without cryptographic detail.
#[derive(Debug, thiserror::Error)]
pub enum ScramError {
    /// Session id, login, or an echoed parameter differs from what was issued.
    #[error("session does not match issued parameters")]
    SessionMismatch,

    /// The pending session was already consumed.
    #[error("session already consumed")]
    SessionConsumed,

    /// The pending session expired.
    #[error("session expired")]
    SessionExpired,

    /// A nonce is shorter than the required minimum.
    #[error("nonce too short")]
    NonceTooShort,

    /// A verifier has the wrong length or is empty.
    #[error("malformed verifier")]
    BadVerifier,

    /// The client proof did not verify.
    #[error("proof verification failed")]
    ProofRejected,

    /// Client-side key derivation failed.
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

pub type Result<T> = std::result::Result<T, ScramError>;
