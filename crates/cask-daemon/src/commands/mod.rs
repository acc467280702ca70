//! RPC command handlers.
//!
//! Each submodule implements the handlers for one API area: parameter
//! parsing here, business rules in the services.

pub mod auth;
pub mod record;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use uuid::Uuid;

use crate::rpc::RpcError;

/// Extract a required string parameter.
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Extract a required base64-encoded byte parameter.
pub(crate) fn required_b64(params: &Value, key: &str) -> Result<Vec<u8>, RpcError> {
    let encoded = required_str(params, key)?;
    STANDARD
        .decode(encoded)
        .map_err(|_| RpcError::invalid_params(&format!("{key} must be base64")))
}

/// Extract a required UUID parameter.
pub(crate) fn required_uuid(params: &Value, key: &str) -> Result<Uuid, RpcError> {
    let raw = required_str(params, key)?;
    Uuid::parse_str(raw).map_err(|_| RpcError::invalid_params(&format!("{key} must be a uuid")))
}

/// Extract an optional UUID parameter.
pub(crate) fn optional_uuid(params: &Value, key: &str) -> Result<Option<Uuid>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => Ok(Some(required_uuid(params, key)?)),
    }
}
