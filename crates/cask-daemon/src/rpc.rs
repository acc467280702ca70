//! Line-delimited JSON RPC server over TCP.
//!
//! Each request is one JSON line; responses are one line each. The two
//! streaming methods extend the framing: `create_record_stream` reads frame
//! lines after the request until an `"end"` frame, `get_record_stream`
//! writes `stream` lines before the final response. TLS is terminated by the
//! fronting proxy.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use cask_types::stream::{DownloadFrame, FrameSink, FrameSource, StreamError, UploadFrame};

use crate::commands;
use crate::context::RequestMeta;
use crate::service::ServiceError;
use crate::DaemonState;

/// RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Version tag (must be "2.0").
    pub jsonrpc: String,
    /// Request ID, echoed on the response.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Request metadata (authorization and friends).
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// One server-streamed frame, tagged with the request it answers.
#[derive(Debug, Serialize)]
struct StreamEnvelope<'a> {
    id: &'a serde_json::Value,
    stream: &'a DownloadFrame,
}

/// One client-streamed frame line.
#[derive(Debug, Deserialize)]
struct FrameEnvelope {
    frame: UploadFrame,
}

/// RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Numeric code.
    pub code: i32,
    /// Stable machine-readable name.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error() -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: None,
        }
    }

    /// Unauthenticated (-32000).
    pub fn unauthenticated(detail: &str) -> Self {
        Self {
            code: -32000,
            message: "UNAUTHENTICATED".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Not found (-32001).
    pub fn not_found() -> Self {
        Self {
            code: -32001,
            message: "NOT_FOUND".to_string(),
            data: None,
        }
    }

    /// Login taken (-32002).
    pub fn login_taken() -> Self {
        Self {
            code: -32002,
            message: "LOGIN_TAKEN".to_string(),
            data: None,
        }
    }

    /// Token revoked (-32003).
    pub fn token_revoked() -> Self {
        Self {
            code: -32003,
            message: "TOKEN_REVOKED".to_string(),
            data: None,
        }
    }

    /// Token expired (-32004).
    pub fn token_expired() -> Self {
        Self {
            code: -32004,
            message: "TOKEN_EXPIRED".to_string(),
            data: None,
        }
    }

    /// Token mismatch (-32005).
    pub fn token_mismatch() -> Self {
        Self {
            code: -32005,
            message: "TOKEN_MISMATCH".to_string(),
            data: None,
        }
    }

    /// Protocol violation (-32006).
    pub fn protocol_violation(detail: &str) -> Self {
        Self {
            code: -32006,
            message: "PROTOCOL_VIOLATION".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Cancelled (-32007).
    pub fn cancelled() -> Self {
        Self {
            code: -32007,
            message: "CANCELLED".to_string(),
            data: None,
        }
    }
}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthenticated(detail) => RpcError::unauthenticated(&detail),
            ServiceError::InvalidArgument(detail) => RpcError::invalid_params(&detail),
            ServiceError::NotFound => RpcError::not_found(),
            ServiceError::LoginTaken => RpcError::login_taken(),
            ServiceError::TokenRevoked => RpcError::token_revoked(),
            ServiceError::TokenExpired => RpcError::token_expired(),
            ServiceError::TokenMismatch => RpcError::token_mismatch(),
            ServiceError::ProtocolViolation(detail) => RpcError::protocol_violation(&detail),
            ServiceError::Cancelled => RpcError::cancelled(),
            ServiceError::Backend(detail) => {
                // Backend detail stays in the log; clients get a stable code.
                error!(error = %detail, "Backend failure");
                RpcError::internal_error()
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    listener: TcpListener,
}

impl RpcServer {
    /// Bind the listener. Port 0 picks an ephemeral port (used by tests).
    pub async fn bind(state: Arc<DaemonState>, addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { state, listener })
    }

    /// The bound address.
    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections until the task is dropped.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("RPC server listening on {:?}", self.listener.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "Connection accepted");
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!(%peer, "Connection error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {e}");
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::TcpStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                write_response(
                    &mut writer,
                    &RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
                )
                .await?;
                continue;
            }
        };

        let response = serve_request(&state, request, &mut reader, &mut writer).await;
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Authenticate (when required), then route the request; streaming methods
/// get handles on the connection halves.
async fn serve_request(
    state: &Arc<DaemonState>,
    request: RpcRequest,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let started = Instant::now();

    debug!(method, "Dispatching RPC method");

    let mut meta = RequestMeta::from_value(&request.meta);
    if requires_auth(method) {
        if let Err(err) = authenticate(state, &mut meta) {
            // An unauthenticated upload still has its frames on the wire;
            // drain them so the connection stays usable.
            if method == "create_record_stream" {
                let mut source = LineFrameSource { reader };
                while let Ok(Some(_)) = source.recv().await {}
            }
            info!(method, code = err.code, "Request rejected");
            return RpcResponse::error(id, err);
        }
    }

    let result = match method {
        "create_record_stream" => {
            let mut source = LineFrameSource { reader };
            commands::record::create_record_stream(state, &meta, &mut source).await
        }
        "get_record_stream" => {
            let mut sink = LineFrameSink { writer, id: &id };
            commands::record::get_record_stream(state, &meta, &request.params, &mut sink).await
        }
        _ => dispatch_request(state, &meta, &request).await,
    };

    let elapsed = started.elapsed();
    match result {
        Ok(value) => {
            info!(method, ?elapsed, "Request completed");
            RpcResponse::success(id, value)
        }
        Err(err) => {
            info!(method, ?elapsed, code = err.code, error = %err.message, "Request failed");
            RpcResponse::error(id, err)
        }
    }
}

/// Dispatch a unary request to the appropriate command handler.
async fn dispatch_request(
    state: &Arc<DaemonState>,
    meta: &RequestMeta,
    request: &RpcRequest,
) -> Result<serde_json::Value, RpcError> {
    let params = &request.params;
    match request.method.as_str() {
        // Auth exchange
        "start_registration" => commands::auth::start_registration(state, params).await,
        "complete_registration" => commands::auth::complete_registration(state, params).await,
        "start_login" => commands::auth::start_login(state, params).await,
        "complete_login" => commands::auth::complete_login(state, params).await,
        "refresh_token" => commands::auth::refresh_token(state, params).await,
        "revoke_token" => commands::auth::revoke_token(state, params).await,

        // Records
        "list_records" => commands::record::list_records(state, meta, params).await,
        "get_record" => commands::record::get_record(state, meta, params).await,
        "create_record" => commands::record::create_record(state, meta, params).await,
        "delete_record" => commands::record::delete_record(state, meta, params).await,

        other => Err(RpcError::method_not_found(other)),
    }
}

/// The auth exchange methods carry their own credentials; everything else
/// requires a bearer access token.
fn requires_auth(method: &str) -> bool {
    !matches!(
        method,
        "start_registration"
            | "complete_registration"
            | "start_login"
            | "complete_login"
            | "refresh_token"
            | "revoke_token"
    )
}

/// Resolve the bearer token and stamp the identity into the request metadata.
fn authenticate(state: &Arc<DaemonState>, meta: &mut RequestMeta) -> Result<(), RpcError> {
    let token = meta
        .bearer_token()
        .ok_or_else(|| RpcError::unauthenticated("missing authorization token"))?;
    let user_id = state
        .tokens
        .authenticate(token)
        .map_err(|_| RpcError::unauthenticated("invalid authorization token"))?;
    meta.set_user_id(user_id);
    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &RpcResponse) -> anyhow::Result<()> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Upload frames read as JSON lines off the connection.
struct LineFrameSource<'a> {
    reader: &'a mut BufReader<OwnedReadHalf>,
}

#[async_trait]
impl FrameSource for LineFrameSource<'_> {
    async fn recv(&mut self) -> Result<Option<UploadFrame>, StreamError> {
        let mut line = String::new();
        let bytes = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::ConnectionReset => {
                    StreamError::Cancelled
                }
                _ => StreamError::Transport(e.to_string()),
            })?;
        if bytes == 0 {
            // Disconnect mid-upload is a cancellation, not a clean end.
            return Err(StreamError::Cancelled);
        }

        let envelope: FrameEnvelope = serde_json::from_str(&line)
            .map_err(|e| StreamError::Transport(format!("malformed frame: {e}")))?;
        match envelope.frame {
            UploadFrame::End => Ok(None),
            frame => Ok(Some(frame)),
        }
    }
}

/// Download frames written as JSON lines onto the connection.
struct LineFrameSink<'a> {
    writer: &'a mut OwnedWriteHalf,
    id: &'a serde_json::Value,
}

#[async_trait]
impl FrameSink for LineFrameSink<'_> {
    async fn send(&mut self, frame: DownloadFrame) -> Result<(), StreamError> {
        let envelope = StreamEnvelope {
            id: self.id,
            stream: &frame,
        };
        let mut payload = serde_json::to_string(&envelope)
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        payload.push('\n');
        self.writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                    StreamError::Cancelled
                }
                _ => StreamError::Transport(e.to_string()),
            })?;
        self.writer
            .flush()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::unauthenticated("x").code, -32000);
        assert_eq!(RpcError::not_found().code, -32001);
        assert_eq!(RpcError::login_taken().code, -32002);
        assert_eq!(RpcError::token_revoked().code, -32003);
        assert_eq!(RpcError::token_expired().code, -32004);
        assert_eq!(RpcError::token_mismatch().code, -32005);
        assert_eq!(RpcError::protocol_violation("x").code, -32006);
        assert_eq!(RpcError::cancelled().code, -32007);
        assert_eq!(RpcError::method_not_found("x").code, -32601);
    }

    #[test]
    fn test_service_error_mapping() {
        let err: RpcError = ServiceError::TokenRevoked.into();
        assert_eq!(err.message, "TOKEN_REVOKED");

        let err: RpcError = ServiceError::ProtocolViolation("chunk first".to_string()).into();
        assert_eq!(err.message, "PROTOCOL_VIOLATION");

        // Backend detail never reaches the wire.
        let err: RpcError = ServiceError::Backend("sqlite exploded".to_string()).into();
        assert_eq!(err.message, "INTERNAL_ERROR");
        assert!(err.data.is_none());
    }

    #[test]
    fn test_auth_gating() {
        for method in [
            "start_registration",
            "complete_registration",
            "start_login",
            "complete_login",
            "refresh_token",
            "revoke_token",
        ] {
            assert!(!requires_auth(method), "{method} must skip bearer auth");
        }
        for method in [
            "list_records",
            "get_record",
            "create_record",
            "delete_record",
            "get_record_stream",
            "create_record_stream",
            "unknown_method",
        ] {
            assert!(requires_auth(method), "{method} must require bearer auth");
        }
    }

    #[test]
    fn test_response_shapes() {
        let ok = RpcResponse::success(serde_json::json!(1), serde_json::json!({"x": 1}));
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err = RpcResponse::error(serde_json::json!(1), RpcError::not_found());
        let json = serde_json::to_string(&err).expect("serialize");
        assert!(json.contains("NOT_FOUND"));
        assert!(!json.contains("result"));
    }
}
