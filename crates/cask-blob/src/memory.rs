//! In-memory blob store for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{collect_chunks, BlobError, BlobReader, BlobStore, ChunkReceiver, Result};

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, chunks: ChunkReceiver) -> Result<u64> {
        // Buffer first so a failed pipe commits nothing.
        let data = collect_chunks(chunks).await?;
        let len = data.len() as u64;
        self.objects
            .lock()
            .expect("blob map lock")
            .insert(key.to_string(), data);
        Ok(len)
    }

    async fn download(&self, key: &str) -> Result<BlobReader> {
        let data = self
            .objects
            .lock()
            .expect("blob map lock")
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().expect("blob map lock").remove(key);
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<u64> {
        self.objects
            .lock()
            .expect("blob map lock")
            .get(key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .lock()
            .expect("blob map lock")
            .contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::test_support::pipe_of;

    #[tokio::test]
    async fn test_roundtrip() {
        let store = MemoryBlobStore::new();
        store
            .upload("k", pipe_of(vec![vec![1, 2], vec![3]], None))
            .await
            .expect("upload");

        let mut reader = store.download("k").await.expect("download");
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.expect("read");
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(store.stat("k").await.expect("stat"), 3);
    }

    #[tokio::test]
    async fn test_cancelled_upload_not_visible() {
        let store = MemoryBlobStore::new();
        let err = store
            .upload(
                "k",
                pipe_of(
                    vec![vec![1]],
                    Some(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "cancelled",
                    )),
                ),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, BlobError::Cancelled));
        assert!(!store.exists("k").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.download("nope").await,
            Err(BlobError::NotFound(_))
        ));
        assert!(matches!(
            store.stat("nope").await,
            Err(BlobError::NotFound(_))
        ));
        store.delete("nope").await.expect("delete missing is fine");
    }
}
