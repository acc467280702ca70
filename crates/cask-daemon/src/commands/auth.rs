//! Authentication and token command handlers.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use cask_types::user::KdfParams;

use crate::commands::{required_b64, required_str, required_uuid};
use crate::rpc::RpcError;
use crate::service::auth::{CompleteLoginParams, CompleteRegistrationParams};
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Begin a registration exchange.
pub async fn start_registration(state: &Arc<DaemonState>, params: &Value) -> Result {
    let login = required_str(params, "login")?;

    let offer = state.auth.start_registration(login).await?;
    Ok(serde_json::json!({
        "session_id": offer.session_id.to_string(),
        "salt_root": STANDARD.encode(&offer.salt_root),
        "kdf_params": kdf_json(&offer.kdf),
    }))
}

/// Finish a registration exchange with the client's verifiers.
pub async fn complete_registration(state: &Arc<DaemonState>, params: &Value) -> Result {
    let request = CompleteRegistrationParams {
        session_id: required_uuid(params, "session_id")?,
        login: required_str(params, "login")?.to_string(),
        salt_root: required_b64(params, "salt_root")?,
        kdf: parse_kdf(params)?,
        stored_key: required_b64(params, "stored_key")?,
        server_key: required_b64(params, "server_key")?,
    };

    state.auth.complete_registration(request).await?;
    Ok(serde_json::json!({}))
}

/// Begin a login exchange.
pub async fn start_login(state: &Arc<DaemonState>, params: &Value) -> Result {
    let login = required_str(params, "login")?;
    let client_nonce = required_b64(params, "client_nonce")?;

    let start = state.auth.start_login(login, &client_nonce).await?;
    Ok(serde_json::json!({
        "session_id": start.session_id.to_string(),
        "server_nonce": STANDARD.encode(&start.server_nonce),
        "salt_root": STANDARD.encode(&start.salt_root),
        "kdf_params": kdf_json(&start.kdf),
    }))
}

/// Finish a login exchange with the client's proof.
pub async fn complete_login(state: &Arc<DaemonState>, params: &Value) -> Result {
    let request = CompleteLoginParams {
        session_id: required_uuid(params, "session_id")?,
        login: required_str(params, "login")?.to_string(),
        client_nonce: required_b64(params, "client_nonce")?,
        server_nonce: required_b64(params, "server_nonce")?,
        client_proof: required_b64(params, "client_proof")?,
    };

    let session = state.auth.complete_login(request).await?;
    Ok(serde_json::json!({
        "server_signature": STANDARD.encode(&session.server_signature),
        "access_token": session.access_token,
        "refresh_token": session.refresh_token,
    }))
}

/// Rotate a refresh token.
pub async fn refresh_token(state: &Arc<DaemonState>, params: &Value) -> Result {
    let presented = required_str(params, "refresh_token")?;

    let (access_token, refresh_token) = state.tokens.refresh(presented).await?;
    Ok(serde_json::json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
    }))
}

/// Revoke a refresh token.
pub async fn revoke_token(state: &Arc<DaemonState>, params: &Value) -> Result {
    let presented = required_str(params, "refresh_token")?;

    state.tokens.revoke(presented).await?;
    Ok(serde_json::json!({}))
}

fn kdf_json(kdf: &KdfParams) -> Value {
    serde_json::json!({
        "time": kdf.time,
        "mem_kib": kdf.mem_kib,
        "parallelism": kdf.parallelism,
    })
}

fn parse_kdf(params: &Value) -> std::result::Result<KdfParams, RpcError> {
    let obj = params
        .get("kdf_params")
        .ok_or_else(|| RpcError::invalid_params("kdf_params required"))?;
    serde_json::from_value(obj.clone())
        .map_err(|_| RpcError::invalid_params("kdf_params malformed"))
}
