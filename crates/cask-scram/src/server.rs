//! Server side of the exchange: offers and verification.
//!
//! The engine is stateless; pending-session rows carry all per-exchange state
//! and are validated here against what the client echoes back.

use cask_crypto::{ct_eq, hmac_sha256, random_salt, sha256, xor};
use cask_types::session::{PendingLogin, PendingSignup, MIN_NONCE_LEN};
use cask_types::user::{KdfParams, VERIFIER_LEN};
use uuid::Uuid;

use crate::message::auth_message;
use crate::{Result, ScramError};

/// Parameters issued when a registration starts.
#[derive(Debug, Clone)]
pub struct RegistrationOffer {
    pub session_id: Uuid,
    pub salt_root: Vec<u8>,
    pub kdf: KdfParams,
}

/// Parameters issued when a login starts.
#[derive(Debug, Clone)]
pub struct LoginOffer {
    pub session_id: Uuid,
    pub server_nonce: Vec<u8>,
}

/// What the client sends to complete a registration.
#[derive(Debug)]
pub struct RegistrationClaim<'a> {
    pub session_id: Uuid,
    pub login: &'a str,
    pub salt_root: &'a [u8],
    pub kdf_params: &'a [u8],
    pub stored_key: &'a [u8],
    pub server_key: &'a [u8],
}

/// What the client sends to complete a login.
#[derive(Debug)]
pub struct LoginClaim<'a> {
    pub session_id: Uuid,
    pub login: &'a str,
    pub client_nonce: &'a [u8],
    pub server_nonce: &'a [u8],
    pub client_proof: &'a [u8],
}

/// Start a registration: fresh session id and root salt, caller-supplied KDF
/// cost parameters.
pub fn prepare_registration(kdf: KdfParams) -> RegistrationOffer {
    RegistrationOffer {
        session_id: Uuid::new_v4(),
        salt_root: random_salt().to_vec(),
        kdf,
    }
}

/// Start a login: fresh session id and server nonce. The client nonce is
/// validated here so a too-short nonce never reaches a pending row.
pub fn prepare_login(client_nonce: &[u8]) -> Result<LoginOffer> {
    if client_nonce.len() < MIN_NONCE_LEN {
        return Err(ScramError::NonceTooShort);
    }
    Ok(LoginOffer {
        session_id: Uuid::new_v4(),
        server_nonce: random_salt().to_vec(),
    })
}

/// Validate a registration completion against its pending session.
///
/// The echoed salt and KDF parameters must be byte-equal to what was issued;
/// verifiers must be exactly [`VERIFIER_LEN`] bytes.
pub fn verify_registration(
    pending: &PendingSignup,
    claim: &RegistrationClaim<'_>,
    now: u64,
) -> Result<()> {
    check_session(
        pending.session_id,
        &pending.login,
        pending.consumed,
        pending.expires_at,
        claim.session_id,
        claim.login,
        now,
    )?;

    if pending.salt_root != claim.salt_root || pending.kdf_params != claim.kdf_params {
        return Err(ScramError::SessionMismatch);
    }
    if claim.stored_key.len() != VERIFIER_LEN || claim.server_key.len() != VERIFIER_LEN {
        return Err(ScramError::BadVerifier);
    }

    Ok(())
}

/// Validate a login completion and verify the client's proof.
///
/// The proof hides `client_key` behind an XOR with the client signature; the
/// server recovers the candidate key and accepts iff its hash equals the
/// stored verifier. The final comparison is constant-time.
pub fn verify_login(
    stored_key: &[u8],
    pending: &PendingLogin,
    claim: &LoginClaim<'_>,
    now: u64,
) -> Result<()> {
    check_session(
        pending.session_id,
        &pending.login,
        pending.consumed,
        pending.expires_at,
        claim.session_id,
        claim.login,
        now,
    )?;

    if pending.client_nonce != claim.client_nonce || pending.server_nonce != claim.server_nonce {
        return Err(ScramError::SessionMismatch);
    }
    if claim.client_proof.len() != VERIFIER_LEN {
        return Err(ScramError::BadVerifier);
    }

    let message = auth_message(claim.login, claim.client_nonce, claim.server_nonce);
    let client_signature = hmac_sha256(stored_key, &message);
    let client_key = xor(claim.client_proof, &client_signature)
        .map_err(|_| ScramError::BadVerifier)?;

    if !ct_eq(&sha256(&client_key), stored_key) {
        return Err(ScramError::ProofRejected);
    }

    Ok(())
}

/// Signature the server returns on successful login so the client can verify
/// it is talking to the holder of `server_key`.
pub fn server_signature(server_key: &[u8], auth_message: &[u8]) -> [u8; 32] {
    hmac_sha256(server_key, auth_message)
}

fn check_session(
    issued_session: Uuid,
    issued_login: &str,
    consumed: bool,
    expires_at: u64,
    claimed_session: Uuid,
    claimed_login: &str,
    now: u64,
) -> Result<()> {
    if issued_session != claimed_session || issued_login != claimed_login {
        return Err(ScramError::SessionMismatch);
    }
    if consumed {
        return Err(ScramError::SessionConsumed);
    }
    if now > expires_at {
        return Err(ScramError::SessionExpired);
    }
    Ok(())
}
