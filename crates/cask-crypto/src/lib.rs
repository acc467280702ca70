//! # cask-crypto
//!
//! Cryptographic primitives shared by the auth protocol engine and the token
//! manager. The suite is fixed: SHA-256 for digests, HMAC-SHA256 for keyed
//! MACs, OS randomness for salts and nonces. Every comparison over
//! secret-derived material goes through [`ct_eq`].

pub mod hash;
pub mod mac;
pub mod random;

pub use hash::sha256;
pub use mac::hmac_sha256;
pub use random::{random_bytes, random_salt};

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Invalid input length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Constant-time equality over byte slices.
///
/// Unequal lengths return false without leaking where they differ.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// XOR two equal-length byte strings.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(CryptoError::InvalidLength {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect())
}
