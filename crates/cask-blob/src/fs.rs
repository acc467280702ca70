//! Filesystem-backed blob store.
//!
//! Objects live under a root directory with the key as a relative path.
//! Uploads write to a temporary file and rename into place on success, so a
//! failed or cancelled upload is never observable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{BlobError, BlobReader, BlobStore, ChunkReceiver, Result};

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are server-generated, but refuse traversal outright.
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(BlobError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid blob key {key:?}"),
            )));
        }
        Ok(self.root.join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!(".upload-{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, mut chunks: ChunkReceiver) -> Result<u64> {
        let target = self.object_path(key)?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).await?;
        let mut written = 0u64;

        let copy_result: Result<()> = async {
            while let Some(chunk) = chunks.recv().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                        return Err(BlobError::Cancelled)
                    }
                    Err(e) => return Err(BlobError::Io(e)),
                };
                file.write_all(&bytes).await?;
                written += bytes.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copy_result {
            drop(file);
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp, &target).await?;
        Ok(written)
    }

    async fn download(&self, key: &str) -> Result<BlobReader> {
        let path = self.object_path(key)?;
        let file = open_existing(&path, key).await?;
        Ok(Box::new(file))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn stat(&self, key: &str) -> Result<u64> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.stat(key).await {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

async fn open_existing(path: &Path, key: &str) -> Result<fs::File> {
    match fs::File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(BlobError::NotFound(key.to_string()))
        }
        Err(e) => Err(BlobError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::test_support::pipe_of;

    async fn store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::open(dir.path().join("blobs"))
            .await
            .expect("open");
        (dir, store)
    }

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        let (_dir, store) = store().await;
        let key = "user-a/record-b/file-c";

        let written = store
            .upload(key, pipe_of(vec![vec![1, 2, 3, 4], vec![5]], None))
            .await
            .expect("upload");
        assert_eq!(written, 5);

        let mut reader = store.download(key).await.expect("download");
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.expect("read");
        assert_eq!(data, vec![1, 2, 3, 4, 5]);

        assert_eq!(store.stat(key).await.expect("stat"), 5);
        assert!(store.exists(key).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_cancelled_upload_commits_nothing() {
        let (_dir, store) = store().await;
        let key = "user-a/record-b/file-d";

        let err = store
            .upload(
                key,
                pipe_of(
                    vec![vec![1, 2, 3]],
                    Some(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "request cancelled",
                    )),
                ),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, BlobError::Cancelled));

        assert!(!store.exists(key).await.expect("exists"));
        assert!(matches!(
            store.download(key).await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_temp_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("blobs");
        let store = FsBlobStore::open(&root).await.expect("open");

        let _ = store
            .upload(
                "user-a/record-b/file-e",
                pipe_of(
                    vec![vec![9; 128]],
                    Some(std::io::Error::other("backend exploded")),
                ),
            )
            .await
            .expect_err("must fail");

        let mut entries = tokio::fs::read_dir(&root).await.expect("read dir");
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            let name = entry.file_name();
            assert!(
                !name.to_string_lossy().starts_with(".upload-"),
                "stale temp file {name:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = store().await;
        let key = "user-a/record-b/file-f";
        store
            .upload(key, pipe_of(vec![vec![1]], None))
            .await
            .expect("upload");

        store.delete(key).await.expect("delete");
        store.delete(key).await.expect("second delete is fine");
        assert!(!store.exists(key).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (_dir, store) = store().await;
        assert!(store.download("../etc/passwd").await.is_err());
        assert!(store.download("").await.is_err());
        assert!(store.download("a//b").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_object_roundtrip() {
        let (_dir, store) = store().await;
        let key = "user-a/record-b/file-empty";
        let written = store.upload(key, pipe_of(vec![], None)).await.expect("upload");
        assert_eq!(written, 0);
        assert_eq!(store.stat(key).await.expect("stat"), 0);
    }
}
