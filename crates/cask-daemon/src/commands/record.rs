//! Record command handlers.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use uuid::Uuid;

use cask_types::record::{CreateRecordParams, Record, RecordType};
use cask_types::stream::{FrameSink, FrameSource};

use crate::commands::{optional_uuid, required_b64, required_str, required_uuid};
use crate::context::RequestMeta;
use crate::rpc::RpcError;
use crate::service::record::record_metadata;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// List records: a plain listing by default, the delta path when a watermark
/// or tombstones are requested.
pub async fn list_records(state: &Arc<DaemonState>, meta: &RequestMeta, params: &Value) -> Result {
    let user_id = authenticated_user(meta)?;
    let type_filter = parse_type_filter(params)?;
    let updated_after = params
        .get("updated_after")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let include_deleted = params
        .get("include_deleted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if updated_after > 0 || include_deleted {
        let delta = state
            .records
            .list_delta(user_id, type_filter, updated_after, include_deleted)
            .await?;
        let tombstones: Vec<Value> = delta
            .tombstones
            .iter()
            .map(|t| {
                serde_json::json!({
                    "record_id": t.id.to_string(),
                    "deleted_at": t.deleted_at,
                })
            })
            .collect();
        return Ok(serde_json::json!({
            "records": metadata_list(&delta.records),
            "tombstones": tombstones,
            "server_time": delta.server_time,
        }));
    }

    let records = state.records.list_records(user_id, type_filter).await?;
    Ok(serde_json::json!({
        "records": metadata_list(&records),
    }))
}

/// Fetch a small record with its inline payload.
pub async fn get_record(state: &Arc<DaemonState>, meta: &RequestMeta, params: &Value) -> Result {
    let user_id = authenticated_user(meta)?;
    let record_id = required_uuid(params, "record_id")?;

    let record = state.records.get_record(user_id, record_id).await?;
    let encrypted_data = record
        .encrypted_data
        .as_deref()
        .map(|data| STANDARD.encode(data))
        .unwrap_or_default();
    Ok(serde_json::json!({
        "metadata": metadata_json(&record),
        "encrypted_data": encrypted_data,
    }))
}

/// Create a small record.
pub async fn create_record(state: &Arc<DaemonState>, meta: &RequestMeta, params: &Value) -> Result {
    let user_id = authenticated_user(meta)?;
    let record_type = parse_record_type(required_str(params, "type")?)?;

    let request = CreateRecordParams {
        user_id,
        name: required_str(params, "name")?.to_string(),
        description: params
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        encrypted_data: required_b64(params, "encrypted_data")?,
        encrypted_key: required_b64(params, "encrypted_key")?,
        algorithm: required_str(params, "algorithm")?.to_string(),
        record_type,
        request_id: optional_uuid(params, "request_id")?,
    };

    let record = state.records.create_record(request).await?;
    Ok(serde_json::json!({"record_id": record.id.to_string()}))
}

/// Soft-delete a record.
pub async fn delete_record(state: &Arc<DaemonState>, meta: &RequestMeta, params: &Value) -> Result {
    let user_id = authenticated_user(meta)?;
    let record_id = required_uuid(params, "record_id")?;

    state.records.delete_record(user_id, record_id).await?;
    Ok(serde_json::json!({}))
}

/// Create a record from a client stream.
pub async fn create_record_stream(
    state: &Arc<DaemonState>,
    meta: &RequestMeta,
    source: &mut dyn FrameSource,
) -> Result {
    let user_id = authenticated_user(meta)?;

    let record = state.records.create_record_stream(user_id, source).await?;
    Ok(serde_json::json!({"record_id": record.id.to_string()}))
}

/// Stream a record back to the client.
pub async fn get_record_stream(
    state: &Arc<DaemonState>,
    meta: &RequestMeta,
    params: &Value,
    sink: &mut dyn FrameSink,
) -> Result {
    let user_id = authenticated_user(meta)?;
    let record_id = required_uuid(params, "record_id")?;

    state.records.stream_record(user_id, record_id, sink).await?;
    Ok(serde_json::json!({}))
}

fn authenticated_user(meta: &RequestMeta) -> std::result::Result<Uuid, RpcError> {
    meta.user_id()
        .ok_or_else(|| RpcError::unauthenticated("missing authenticated identity"))
}

fn parse_type_filter(params: &Value) -> std::result::Result<Option<RecordType>, RpcError> {
    match params.get("type_filter") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let raw = value
                .as_str()
                .ok_or_else(|| RpcError::invalid_params("type_filter must be a string"))?;
            Ok(Some(parse_record_type(raw)?))
        }
    }
}

fn parse_record_type(raw: &str) -> std::result::Result<RecordType, RpcError> {
    RecordType::parse(raw)
        .ok_or_else(|| RpcError::invalid_params(&format!("unknown record type {raw:?}")))
}

fn metadata_json(record: &Record) -> Value {
    serde_json::to_value(record_metadata(record)).unwrap_or(Value::Null)
}

fn metadata_list(records: &[Record]) -> Vec<Value> {
    records.iter().map(metadata_json).collect()
}
