//! Client-side key derivation and proof construction.
//!
//! The daemon never runs this against real passphrases; it exists so tests
//! and reference clients can drive the full exchange. The salted password is
//! wiped as soon as the derived material is produced.

use argon2::{Algorithm, Argon2, Params, Version};
use cask_crypto::{hmac_sha256, sha256, xor};
use cask_types::user::KdfParams;
use zeroize::Zeroizing;

use crate::{Result, ScramError};

const CLIENT_KEY_CONTEXT: &[u8] = b"Client Key";
const SERVER_KEY_CONTEXT: &[u8] = b"Server Key";

/// The two verifiers a client submits at registration.
#[derive(Debug, Clone)]
pub struct Verifiers {
    pub stored_key: [u8; 32],
    pub server_key: [u8; 32],
}

/// Argon2id over the passphrase and root salt with the issued parameters.
fn derive_salted(passphrase: &[u8], salt: &[u8], kdf: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    let params = Params::new(kdf.mem_kib, kdf.time, u32::from(kdf.parallelism), Some(32))
        .map_err(|e| ScramError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut salted = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, salted.as_mut())
        .map_err(|e| ScramError::Kdf(e.to_string()))?;
    Ok(salted)
}

/// Derive the registration verifiers from a passphrase.
pub fn derive_verifiers(passphrase: &[u8], salt: &[u8], kdf: &KdfParams) -> Result<Verifiers> {
    let salted = derive_salted(passphrase, salt, kdf)?;
    let client_key = Zeroizing::new(hmac_sha256(salted.as_ref(), CLIENT_KEY_CONTEXT));
    Ok(Verifiers {
        stored_key: sha256(client_key.as_ref()),
        server_key: hmac_sha256(salted.as_ref(), SERVER_KEY_CONTEXT),
    })
}

/// Build the login proof: `client_key XOR HMAC(stored_key, auth_message)`.
pub fn client_proof(
    passphrase: &[u8],
    salt: &[u8],
    kdf: &KdfParams,
    auth_message: &[u8],
) -> Result<[u8; 32]> {
    let salted = derive_salted(passphrase, salt, kdf)?;
    let client_key = Zeroizing::new(hmac_sha256(salted.as_ref(), CLIENT_KEY_CONTEXT));
    let stored_key = sha256(client_key.as_ref());
    let client_signature = hmac_sha256(&stored_key, auth_message);

    let proof = xor(client_key.as_ref(), &client_signature)
        .map_err(|e| ScramError::Kdf(e.to_string()))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&proof);
    Ok(out)
}

/// What the client expects the server signature to be.
pub fn expected_server_signature(
    passphrase: &[u8],
    salt: &[u8],
    kdf: &KdfParams,
    auth_message: &[u8],
) -> Result<[u8; 32]> {
    let salted = derive_salted(passphrase, salt, kdf)?;
    Ok(hmac_sha256(
        &hmac_sha256(salted.as_ref(), SERVER_KEY_CONTEXT),
        auth_message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kdf() -> KdfParams {
        KdfParams {
            time: 1,
            mem_kib: 1024,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derivation_deterministic() {
        let k = kdf();
        let a = derive_verifiers(b"pass", b"0123456789abcdef", &k).expect("derive");
        let b = derive_verifiers(b"pass", b"0123456789abcdef", &k).expect("derive");
        assert_eq!(a.stored_key, b.stored_key);
        assert_eq!(a.server_key, b.server_key);
    }

    #[test]
    fn test_derivation_salt_sensitive() {
        let k = kdf();
        let a = derive_verifiers(b"pass", b"0123456789abcdef", &k).expect("derive");
        let b = derive_verifiers(b"pass", b"fedcba9876543210", &k).expect("derive");
        assert_ne!(a.stored_key, b.stored_key);
    }

    #[test]
    fn test_stored_and_server_keys_differ() {
        let v = derive_verifiers(b"pass", b"0123456789abcdef", &kdf()).expect("derive");
        assert_ne!(v.stored_key, v.server_key);
    }
}
