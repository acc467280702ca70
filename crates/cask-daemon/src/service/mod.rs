//! Business services: auth exchange, token lifecycle, record sync.

pub mod auth;
pub mod record;
pub mod token;

pub use auth::AuthService;
pub use record::RecordService;
pub use token::TokenService;

use cask_blob::BlobError;
use cask_db::DbError;
use cask_scram::ScramError;
use cask_token::TokenError;
use cask_types::stream::StreamError;

/// Service-level error kinds, mapped one-to-one onto wire codes by the demux.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("login already taken")]
    LoginTaken,

    #[error("refresh token revoked")]
    TokenRevoked,

    #[error("refresh token expired")]
    TokenExpired,

    #[error("refresh token mismatch")]
    TokenMismatch,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("request cancelled")]
    Cancelled,

    /// Wrapped backend failure; the detail is logged, not sent to clients.
    #[error("backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ServiceError::NotFound,
            other => ServiceError::Backend(other.to_string()),
        }
    }
}

impl From<BlobError> for ServiceError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Cancelled => ServiceError::Cancelled,
            BlobError::NotFound(_) => ServiceError::NotFound,
            other => ServiceError::Backend(other.to_string()),
        }
    }
}

impl From<ScramError> for ServiceError {
    fn from(err: ScramError) -> Self {
        match err {
            // A malformed start request is the client's bug, not an auth failure.
            ScramError::NonceTooShort => {
                ServiceError::InvalidArgument("client nonce must be at least 16 bytes".to_string())
            }
            // Everything else collapses to an opaque auth failure; the
            // specific reason is logged server-side only.
            _ => ServiceError::Unauthenticated("authentication failed".to_string()),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(_: TokenError) -> Self {
        ServiceError::Unauthenticated("invalid token".to_string())
    }
}

impl From<StreamError> for ServiceError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Cancelled => ServiceError::Cancelled,
            StreamError::Transport(detail) => ServiceError::Backend(detail),
        }
    }
}
