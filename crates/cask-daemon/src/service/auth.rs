//! Registration and login orchestration over the protocol engine and stores.

use std::sync::Arc;

use cask_db::queries::{sessions, users};
use cask_db::DbError;
use cask_scram::{server as scram, LoginClaim, RegistrationClaim, RegistrationOffer};
use cask_types::now_unix;
use cask_types::session::{PendingLogin, PendingSignup, PENDING_SESSION_TTL_SECS};
use cask_types::user::{KdfParams, User};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::service::{Result, ServiceError, TokenService};
use crate::Db;

/// What `start_login` hands back to the client.
#[derive(Debug)]
pub struct LoginStart {
    pub session_id: Uuid,
    pub server_nonce: Vec<u8>,
    pub salt_root: Vec<u8>,
    pub kdf: KdfParams,
}

/// Completion parameters echoed by the registering client.
pub struct CompleteRegistrationParams {
    pub session_id: Uuid,
    pub login: String,
    pub salt_root: Vec<u8>,
    pub kdf: KdfParams,
    pub stored_key: Vec<u8>,
    pub server_key: Vec<u8>,
}

/// Completion parameters echoed by the logging-in client.
pub struct CompleteLoginParams {
    pub session_id: Uuid,
    pub login: String,
    pub client_nonce: Vec<u8>,
    pub server_nonce: Vec<u8>,
    pub client_proof: Vec<u8>,
}

/// A successful login: the server's proof plus a fresh token pair.
#[derive(Debug)]
pub struct LoginSession {
    pub server_signature: Vec<u8>,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    db: Db,
    tokens: Arc<TokenService>,
    kdf: KdfParams,
}

impl AuthService {
    pub fn new(db: Db, tokens: Arc<TokenService>, kdf: KdfParams) -> Self {
        Self { db, tokens, kdf }
    }

    /// Start a registration: pick session id, salt, and KDF parameters, and
    /// park them in a pending session the completion call must echo.
    pub async fn start_registration(&self, login: &str) -> Result<RegistrationOffer> {
        debug!(login, "Auth service: starting registration");
        validate_login(login)?;

        let conn = self.db.lock().await;
        match users::get_by_login(&conn, login) {
            Ok(_) => {
                info!(login, "Auth service: login already registered");
                return Err(ServiceError::LoginTaken);
            }
            Err(DbError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let offer = scram::prepare_registration(self.kdf);
        let pending = PendingSignup {
            session_id: offer.session_id,
            login: login.to_string(),
            salt_root: offer.salt_root.clone(),
            kdf_params: self.kdf.to_bytes(),
            expires_at: now_unix() + PENDING_SESSION_TTL_SECS,
            consumed: false,
        };
        sessions::create_signup(&conn, &pending)?;

        info!(login, session_id = %offer.session_id, "Auth service: registration started");
        Ok(offer)
    }

    /// Complete a registration: verify the echoed parameters, spend the
    /// pending session, and create the account.
    pub async fn complete_registration(&self, params: CompleteRegistrationParams) -> Result<()> {
        debug!(login = %params.login, session_id = %params.session_id,
            "Auth service: finishing registration");

        let conn = self.db.lock().await;
        let pending = match sessions::get_signup(&conn, params.session_id) {
            Ok(pending) => pending,
            Err(DbError::NotFound) => {
                return Err(ServiceError::Unauthenticated(
                    "unknown registration session".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let kdf_bytes = params.kdf.to_bytes();
        let claim = RegistrationClaim {
            session_id: params.session_id,
            login: &params.login,
            salt_root: &params.salt_root,
            kdf_params: &kdf_bytes,
            stored_key: &params.stored_key,
            server_key: &params.server_key,
        };
        if let Err(e) = scram::verify_registration(&pending, &claim, now_unix()) {
            warn!(login = %params.login, session_id = %params.session_id, error = %e,
                "Auth service: registration verification failed");
            return Err(e.into());
        }

        // The login may have been taken while the session was pending.
        match users::get_by_login(&conn, &params.login) {
            Ok(_) => return Err(ServiceError::LoginTaken),
            Err(DbError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        // The session is one-shot regardless of how the insert goes.
        sessions::consume_signup(&conn, params.session_id)?;

        let user = User {
            id: Uuid::new_v4(),
            login: params.login.clone(),
            stored_key: params.stored_key,
            server_key: params.server_key,
            salt_root: params.salt_root,
            kdf_params: pending.kdf_params,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        match users::create(&conn, &user) {
            Ok(_) => {}
            Err(DbError::Conflict(_)) => return Err(ServiceError::LoginTaken),
            Err(e) => return Err(e.into()),
        }

        info!(login = %params.login, user_id = %user.id,
            "Auth service: registration completed");
        Ok(())
    }

    /// Start a login: look up the account, mint a server nonce, and park the
    /// exchange state in a pending session.
    pub async fn start_login(&self, login: &str, client_nonce: &[u8]) -> Result<LoginStart> {
        debug!(login, "Auth service: starting login");

        let conn = self.db.lock().await;
        let user = users::get_by_login(&conn, login)?;

        let offer = scram::prepare_login(client_nonce)?;
        let pending = PendingLogin {
            session_id: offer.session_id,
            login: login.to_string(),
            client_nonce: client_nonce.to_vec(),
            server_nonce: offer.server_nonce.clone(),
            expires_at: now_unix() + PENDING_SESSION_TTL_SECS,
            consumed: false,
        };
        sessions::create_login(&conn, &pending)?;

        let kdf = KdfParams::from_bytes(&user.kdf_params)
            .ok_or_else(|| ServiceError::Backend("stored kdf parameters malformed".to_string()))?;

        info!(login, session_id = %offer.session_id, "Auth service: login started");
        Ok(LoginStart {
            session_id: offer.session_id,
            server_nonce: offer.server_nonce,
            salt_root: user.salt_root,
            kdf,
        })
    }

    /// Complete a login: verify the proof, spend the session, and issue the
    /// token pair alongside the server signature.
    pub async fn complete_login(&self, params: CompleteLoginParams) -> Result<LoginSession> {
        debug!(login = %params.login, session_id = %params.session_id,
            "Auth service: finishing login");

        let conn = self.db.lock().await;
        let user = match users::get_by_login(&conn, &params.login) {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(ServiceError::Unauthenticated(
                    "authentication failed".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        let pending = match sessions::get_login(&conn, params.session_id) {
            Ok(pending) => pending,
            Err(DbError::NotFound) => {
                return Err(ServiceError::Unauthenticated(
                    "unknown login session".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let claim = LoginClaim {
            session_id: params.session_id,
            login: &params.login,
            client_nonce: &params.client_nonce,
            server_nonce: &params.server_nonce,
            client_proof: &params.client_proof,
        };
        if let Err(e) = scram::verify_login(&user.stored_key, &pending, &claim, now_unix()) {
            warn!(login = %params.login, session_id = %params.session_id, error = %e,
                "Auth service: login verification failed");
            return Err(e.into());
        }

        let message =
            cask_scram::message::auth_message(&params.login, &pending.client_nonce, &pending.server_nonce);
        let server_signature = scram::server_signature(&user.server_key, &message).to_vec();

        sessions::consume_login(&conn, params.session_id)?;

        // The token service takes the same lock; release ours first.
        drop(conn);
        let (access_token, refresh_token) = self.tokens.issue(user.id).await?;

        info!(login = %params.login, user_id = %user.id, "Auth service: login completed");
        Ok(LoginSession {
            server_signature,
            access_token,
            refresh_token,
        })
    }
}

fn validate_login(login: &str) -> Result<()> {
    if login.is_empty() || login.len() > 255 {
        return Err(ServiceError::InvalidArgument(
            "login must be 1..=255 bytes".to_string(),
        ));
    }
    Ok(())
}
