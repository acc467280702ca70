//! # cask-blob
//!
//! Opaque byte-stream storage behind the [`BlobStore`] trait: upload,
//! download, delete, stat, keyed by `user-<uuid>/record-<uuid>/file-<uuid>`.
//!
//! Uploads consume a bounded channel of chunks — the in-process pipe between
//! the request stream and the store. The sender blocks when the store is
//! slow (backpressure) and closes the pipe with an error on cancellation, in
//! which case nothing is committed.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Error types for blob operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No object under the given key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The upload pipe was closed with a cancellation error.
    #[error("upload cancelled")]
    Cancelled,

    /// Backend I/O failure.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;

/// Readable byte stream handed back by [`BlobStore::download`].
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Chunk pipe feeding an upload. `Err` items abort the upload.
pub type ChunkReceiver = mpsc::Receiver<std::io::Result<Vec<u8>>>;

/// Object storage for encrypted payloads.
///
/// Implementations must be safe for concurrent use; the daemon shares one
/// instance across all request tasks.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the concatenation of all chunks under `key`, atomically: either
    /// the whole object becomes visible or nothing does. Returns the number
    /// of bytes written.
    async fn upload(&self, key: &str, chunks: ChunkReceiver) -> Result<u64>;

    /// Open the object for reading.
    async fn download(&self, key: &str) -> Result<BlobReader>;

    /// Remove the object. Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Size of the stored object in bytes.
    async fn stat(&self, key: &str) -> Result<u64>;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Drain a chunk receiver into a buffer. Shared by backends.
async fn collect_chunks(mut chunks: ChunkReceiver) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = chunks.recv().await {
        match chunk {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                return Err(BlobError::Cancelled)
            }
            Err(e) => return Err(BlobError::Io(e)),
        }
    }
    Ok(data)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Feed a list of chunks through a pipe, optionally ending with an error.
    pub fn pipe_of(
        chunks: Vec<Vec<u8>>,
        tail_error: Option<std::io::Error>,
    ) -> ChunkReceiver {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if let Some(err) = tail_error {
                let _ = tx.send(Err(err)).await;
            }
        });
        rx
    }
}
