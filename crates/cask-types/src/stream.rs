//! Frame types and adapter traits for the streaming record endpoints.
//!
//! The transport delivers frames as tagged variants; adapters at the RPC
//! boundary implement [`FrameSource`] / [`FrameSink`] over the actual socket,
//! and tests implement them over channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::{RecordMetadata, UploadMetadata};

/// One frame of a client-streaming upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadFrame {
    /// Record metadata; must arrive before any data.
    Metadata(UploadMetadata),
    /// Base64-encoded ciphertext chunk.
    Chunk(String),
    /// Explicit end of stream.
    End,
}

/// One frame of a server-streaming download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadFrame {
    /// Sent first, carries no data.
    Metadata(RecordMetadata),
    Chunk {
        /// Base64-encoded ciphertext chunk.
        data: String,
        is_last_chunk: bool,
    },
}

/// Why a stream operation stopped early.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The request was cancelled by the caller.
    #[error("stream cancelled")]
    Cancelled,
    /// Transport-level failure (socket closed mid-frame, bad framing).
    #[error("stream transport error: {0}")]
    Transport(String),
}

/// Receives upload frames from a client stream. `Ok(None)` is end of stream.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Result<Option<UploadFrame>, StreamError>;
}

/// Sends download frames to a client stream.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: DownloadFrame) -> Result<(), StreamError>;
}
