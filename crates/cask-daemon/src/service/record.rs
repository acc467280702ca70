//! Record ingestion and sync: unary create, streaming upload/download,
//! delta queries, soft delete.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cask_blob::BlobStore;
use cask_db::queries::{records, users};
use cask_db::DbError;
use cask_types::now_unix;
use cask_types::record::{
    CreateRecordParams, Record, RecordMetadata, RecordType, Tombstone, UploadMetadata,
    MAX_NAME_LEN,
};
use cask_types::stream::{DownloadFrame, FrameSink, FrameSource, StreamError, UploadFrame};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::service::{Result, ServiceError};
use crate::Db;

/// Frames tolerated before usable metadata arrives.
const METADATA_FRAME_LIMIT: usize = 100;

/// Upload pipe depth in chunks; the sender blocks when the store is slower
/// than the client.
const UPLOAD_PIPE_DEPTH: usize = 8;

/// A user's delta since a watermark.
pub struct Delta {
    pub records: Vec<Record>,
    pub tombstones: Vec<Tombstone>,
    pub server_time: u64,
}

pub struct RecordService {
    db: Db,
    blob: Arc<dyn BlobStore>,
}

impl RecordService {
    pub fn new(db: Db, blob: Arc<dyn BlobStore>) -> Self {
        Self { db, blob }
    }

    /// Create a small record with an inline payload.
    pub async fn create_record(&self, params: CreateRecordParams) -> Result<Record> {
        validate_metadata(
            &params.name,
            &params.encrypted_key,
            &params.algorithm,
            params.record_type,
            0,
        )?;

        let conn = self.db.lock().await;
        self.check_user(&conn, params.user_id)?;

        let record = Record {
            id: Uuid::new_v4(),
            owner_id: params.user_id,
            name: params.name,
            description: params.description,
            encrypted_data: Some(params.encrypted_data),
            blob_key: None,
            encrypted_key: params.encrypted_key,
            algorithm: params.algorithm,
            record_type: params.record_type,
            encrypted_chunk_size: 0,
            request_id: params.request_id,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        let saved = records::create(&conn, &record)?;
        info!(record_id = %saved.id, user_id = %saved.owner_id, "Record created");
        Ok(saved)
    }

    /// Fetch one record. Records owned by someone else are reported as
    /// absent, indistinguishable from a true miss.
    pub async fn get_record(&self, user_id: Uuid, record_id: Uuid) -> Result<Record> {
        let conn = self.db.lock().await;
        let record = records::get_by_id(&conn, record_id)?;
        if record.owner_id != user_id {
            return Err(ServiceError::NotFound);
        }
        Ok(record)
    }

    /// Plain listing, newest first, optionally filtered by type.
    pub async fn list_records(
        &self,
        user_id: Uuid,
        record_type: Option<RecordType>,
    ) -> Result<Vec<Record>> {
        let conn = self.db.lock().await;
        Ok(records::list_by_owner(&conn, user_id, record_type)?)
    }

    /// Delta since a watermark: changed records, optionally tombstones, and
    /// the server time clients use as their next watermark.
    ///
    /// The watermark is monotonic rather than snapshot-consistent; clients
    /// may see a record twice across adjacent deltas and reconcile by id.
    pub async fn list_delta(
        &self,
        user_id: Uuid,
        record_type: Option<RecordType>,
        updated_after: u64,
        include_deleted: bool,
    ) -> Result<Delta> {
        let conn = self.db.lock().await;
        let changed = records::updated_after(&conn, user_id, record_type, updated_after)?;
        let tombstones = if include_deleted {
            records::deleted_after(&conn, user_id, record_type, updated_after)?
        } else {
            Vec::new()
        };

        Ok(Delta {
            records: changed,
            tombstones,
            server_time: now_unix(),
        })
    }

    /// Soft-delete a record, deleting its blob first (best effort).
    pub async fn delete_record(&self, user_id: Uuid, record_id: Uuid) -> Result<()> {
        let record = self.get_record(user_id, record_id).await?;

        if let Some(key) = &record.blob_key {
            if let Err(e) = self.blob.delete(key).await {
                error!(record_id = %record_id, key, error = %e,
                    "Failed to delete blob for record; continuing with soft delete");
            }
        }

        let conn = self.db.lock().await;
        records::soft_delete(&conn, record_id)?;
        info!(record_id = %record_id, user_id = %user_id, "Record deleted");
        Ok(())
    }

    /// Create a record from a client stream: metadata frame first, then
    /// chunks pumped through a bounded pipe into the blob store, then the
    /// metadata insert. A failed insert compensates by deleting the blob.
    pub async fn create_record_stream(
        &self,
        user_id: Uuid,
        source: &mut dyn FrameSource,
    ) -> Result<Record> {
        {
            let conn = self.db.lock().await;
            self.check_user(&conn, user_id)?;
        }

        let metadata = read_metadata(source).await?;
        let encrypted_key = decode_b64(&metadata.encrypted_key, "encrypted_key")?;
        validate_metadata(
            &metadata.name,
            &encrypted_key,
            &metadata.algorithm,
            metadata.record_type,
            metadata.chunk_size,
        )?;

        let record_id = Uuid::new_v4();
        let blob_key = format!(
            "user-{user_id}/record-{record_id}/file-{file_id}",
            file_id = Uuid::new_v4()
        );

        // The pipe: the pump copies stream chunks in while the store drains
        // it. The bounded channel is the backpressure.
        let (tx, rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(UPLOAD_PIPE_DEPTH);
        let upload = self.blob.upload(&blob_key, rx);
        let pump = pump_chunks(source, tx);
        let (upload_result, pump_result) = tokio::join!(upload, pump);

        // A pump failure closed the pipe with an error, so the upload
        // reports it too; surface the pump's reason.
        pump_result?;
        let bytes = upload_result?;
        debug!(key = %blob_key, bytes, "Stream upload committed to blob store");

        let record = Record {
            id: record_id,
            owner_id: user_id,
            name: metadata.name,
            description: metadata.description,
            encrypted_data: None,
            blob_key: Some(blob_key.clone()),
            encrypted_key,
            algorithm: metadata.algorithm,
            record_type: metadata.record_type,
            encrypted_chunk_size: metadata.chunk_size,
            request_id: metadata.request_id,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };

        let insert_result = {
            let conn = self.db.lock().await;
            records::create(&conn, &record)
        };
        match insert_result {
            Ok(saved) => {
                info!(record_id = %saved.id, user_id = %user_id, key = %blob_key, bytes,
                    "Streamed record created");
                Ok(saved)
            }
            Err(e) => {
                // Compensation: the blob exists but no row references it.
                if let Err(del) = self.blob.delete(&blob_key).await {
                    error!(key = %blob_key, error = %del,
                        "Failed to delete orphaned blob after record insert failure");
                }
                Err(e.into())
            }
        }
    }

    /// Stream a record to a client: metadata frame, then chunks of
    /// `encrypted_chunk_size` bytes, the final one marked.
    pub async fn stream_record(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        sink: &mut dyn FrameSink,
    ) -> Result<()> {
        let record = self.get_record(user_id, record_id).await?;
        let metadata = record_metadata(&record);

        sink.send(DownloadFrame::Metadata(metadata)).await?;

        let Some(blob_key) = record.blob_key.as_deref() else {
            return Err(ServiceError::InvalidArgument(
                "record has no streamable data".to_string(),
            ));
        };
        let chunk_size = record.encrypted_chunk_size as usize;
        if chunk_size == 0 {
            return Err(ServiceError::Backend(format!(
                "record {record_id} has invalid encrypted chunk size 0"
            )));
        }

        let mut reader = self.blob.download(blob_key).await?;
        let mut total = 0u64;

        // Read one chunk ahead so the final chunk can be marked without
        // relying on a short read: an exact-multiple payload still ends with
        // `is_last_chunk`.
        let mut current = read_chunk(&mut reader, chunk_size).await?;
        while !current.is_empty() {
            let next = read_chunk(&mut reader, chunk_size).await?;
            let is_last_chunk = next.is_empty();
            total += current.len() as u64;
            sink.send(DownloadFrame::Chunk {
                data: STANDARD.encode(&current),
                is_last_chunk,
            })
            .await?;
            current = next;
        }

        info!(record_id = %record_id, user_id = %user_id, bytes = total,
            "Record streamed to client");
        Ok(())
    }

    fn check_user(&self, conn: &rusqlite::Connection, user_id: Uuid) -> Result<()> {
        match users::get_by_id(conn, user_id) {
            Ok(_) => Ok(()),
            Err(DbError::NotFound) => Err(ServiceError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy chunk frames from the stream into the pipe until end of stream.
/// On cancellation or malformed input, close the pipe with an error so the
/// uploader aborts, and report the reason.
async fn pump_chunks(
    source: &mut dyn FrameSource,
    tx: mpsc::Sender<std::io::Result<Vec<u8>>>,
) -> Result<()> {
    loop {
        match source.recv().await {
            Ok(Some(UploadFrame::Metadata(_))) => {
                warn!("Received metadata after initial metadata, skipping");
            }
            Ok(Some(UploadFrame::Chunk(encoded))) => {
                if encoded.is_empty() {
                    warn!("Received empty data chunk, skipping");
                    continue;
                }
                let bytes = match STANDARD.decode(&encoded) {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        let reason = "chunk payload is not valid base64";
                        let _ = tx.send(Err(std::io::Error::other(reason))).await;
                        return Err(ServiceError::InvalidArgument(reason.to_string()));
                    }
                };
                if bytes.is_empty() {
                    continue;
                }
                if tx.send(Ok(bytes)).await.is_err() {
                    // Uploader went away; its error will surface.
                    return Ok(());
                }
            }
            Ok(Some(UploadFrame::End)) | Ok(None) => return Ok(()),
            Err(StreamError::Cancelled) => {
                let _ = tx
                    .send(Err(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "request cancelled",
                    )))
                    .await;
                return Err(ServiceError::Cancelled);
            }
            Err(e) => {
                let _ = tx
                    .send(Err(std::io::Error::other("stream transport failed")))
                    .await;
                return Err(e.into());
            }
        }
    }
}

/// Read frames until the metadata arrives, enforcing the framing contract.
async fn read_metadata(source: &mut dyn FrameSource) -> Result<UploadMetadata> {
    let mut attempts = 0usize;
    while attempts < METADATA_FRAME_LIMIT {
        match source.recv().await? {
            Some(UploadFrame::Metadata(metadata)) => return Ok(metadata),
            Some(UploadFrame::Chunk(encoded)) => {
                if !encoded.is_empty() {
                    return Err(ServiceError::ProtocolViolation(
                        "received data chunk before metadata".to_string(),
                    ));
                }
                warn!("Received empty chunk before metadata, skipping");
                attempts += 1;
            }
            Some(UploadFrame::End) | None => {
                return Err(ServiceError::InvalidArgument(
                    "stream closed before metadata received".to_string(),
                ))
            }
        }
    }
    Err(ServiceError::InvalidArgument(format!(
        "metadata not received after {METADATA_FRAME_LIMIT} frames"
    )))
}

/// Fill up to `chunk_size` bytes from the reader; shorter only at EOF.
async fn read_chunk(
    reader: &mut (dyn tokio::io::AsyncRead + Send + Unpin),
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; chunk_size];
    let mut filled = 0usize;
    while filled < chunk_size {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| ServiceError::Backend(format!("blob read failed: {e}")))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

fn validate_metadata(
    name: &str,
    encrypted_key: &[u8],
    algorithm: &str,
    record_type: RecordType,
    chunk_size: u32,
) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ServiceError::InvalidArgument(
            "record name must be 1..=255 bytes".to_string(),
        ));
    }
    if encrypted_key.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "encrypted key is required".to_string(),
        ));
    }
    if algorithm.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "encryption algorithm is required".to_string(),
        ));
    }
    if record_type == RecordType::Binary && chunk_size == 0 {
        return Err(ServiceError::InvalidArgument(
            "chunk size must be >= 1 for binary records".to_string(),
        ));
    }
    Ok(())
}

fn decode_b64(encoded: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|_| ServiceError::InvalidArgument(format!("{field} is not valid base64")))
}

/// Wire metadata view of a record.
pub fn record_metadata(record: &Record) -> RecordMetadata {
    RecordMetadata {
        id: record.id,
        name: record.name.clone(),
        description: record.description.clone(),
        encrypted_key: STANDARD.encode(&record.encrypted_key),
        algorithm: record.algorithm.clone(),
        record_type: record.record_type,
        chunk_size: record.encrypted_chunk_size,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use cask_blob::MemoryBlobStore;
    use cask_db::queries::users;
    use cask_types::user::User;

    use super::*;

    /// Feeds a fixed frame script to the service.
    struct ScriptSource {
        frames: std::collections::VecDeque<std::result::Result<Option<UploadFrame>, StreamError>>,
    }

    impl ScriptSource {
        fn new(frames: Vec<UploadFrame>) -> Self {
            let mut script: std::collections::VecDeque<_> =
                frames.into_iter().map(|f| Ok(Some(f))).collect();
            script.push_back(Ok(None));
            Self { frames: script }
        }

        fn with_tail_error(frames: Vec<UploadFrame>, err: StreamError) -> Self {
            let mut script: std::collections::VecDeque<_> =
                frames.into_iter().map(|f| Ok(Some(f))).collect();
            script.push_back(Err(err));
            Self { frames: script }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptSource {
        async fn recv(&mut self) -> std::result::Result<Option<UploadFrame>, StreamError> {
            self.frames.pop_front().unwrap_or(Ok(None))
        }
    }

    /// Collects frames sent by the service.
    #[derive(Default)]
    struct CollectSink {
        frames: Vec<DownloadFrame>,
    }

    #[async_trait]
    impl FrameSink for CollectSink {
        async fn send(&mut self, frame: DownloadFrame) -> std::result::Result<(), StreamError> {
            self.frames.push(frame);
            Ok(())
        }
    }

    fn binary_metadata(chunk_size: u32) -> UploadFrame {
        UploadFrame::Metadata(UploadMetadata {
            name: "f".to_string(),
            description: String::new(),
            encrypted_key: STANDARD.encode(b"k"),
            algorithm: "a".to_string(),
            record_type: RecordType::Binary,
            chunk_size,
            request_id: None,
        })
    }

    async fn service_with_user() -> (RecordService, Uuid) {
        let conn = cask_db::open_memory().expect("open");
        let user = User {
            id: Uuid::new_v4(),
            login: "a@b.c".to_string(),
            stored_key: vec![1u8; 32],
            server_key: vec![2u8; 32],
            salt_root: vec![3u8; 16],
            kdf_params: b"{}".to_vec(),
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        users::create(&conn, &user).expect("user");
        let svc = RecordService::new(
            Arc::new(tokio::sync::Mutex::new(conn)),
            Arc::new(MemoryBlobStore::new()),
        );
        (svc, user.id)
    }

    fn small_params(user_id: Uuid) -> CreateRecordParams {
        CreateRecordParams {
            user_id,
            name: "n".to_string(),
            description: String::new(),
            encrypted_data: b"X".to_vec(),
            encrypted_key: b"k".to_vec(),
            algorithm: "a".to_string(),
            record_type: RecordType::Login,
            request_id: None,
        }
    }

    #[tokio::test]
    async fn test_small_create_and_get() {
        let (svc, user) = service_with_user().await;
        let record = svc.create_record(small_params(user)).await.expect("create");
        assert!(record.blob_key.is_none());

        let loaded = svc.get_record(user, record.id).await.expect("get");
        assert_eq!(loaded.encrypted_data, Some(b"X".to_vec()));
    }

    #[tokio::test]
    async fn test_create_unknown_user_not_found() {
        let (svc, _) = service_with_user().await;
        let err = svc
            .create_record(small_params(Uuid::new_v4()))
            .await
            .expect_err("unknown user");
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_ownership_masquerades_as_absence() {
        let (svc, user) = service_with_user().await;
        let record = svc.create_record(small_params(user)).await.expect("create");

        let stranger = Uuid::new_v4();
        let err = svc.get_record(stranger, record.id).await.expect_err("hidden");
        assert!(matches!(err, ServiceError::NotFound));

        let missing = svc
            .get_record(stranger, Uuid::new_v4())
            .await
            .expect_err("truly absent");
        assert!(matches!(missing, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_validation_boundaries() {
        let (svc, user) = service_with_user().await;

        let mut p = small_params(user);
        p.name = String::new();
        assert!(matches!(
            svc.create_record(p).await,
            Err(ServiceError::InvalidArgument(_))
        ));

        let mut p = small_params(user);
        p.name = "x".repeat(256);
        assert!(matches!(
            svc.create_record(p).await,
            Err(ServiceError::InvalidArgument(_))
        ));

        let mut p = small_params(user);
        p.encrypted_key = Vec::new();
        assert!(matches!(
            svc.create_record(p).await,
            Err(ServiceError::InvalidArgument(_))
        ));

        let mut p = small_params(user);
        p.algorithm = String::new();
        assert!(matches!(
            svc.create_record(p).await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_roundtrip_preserves_bytes() {
        let (svc, user) = service_with_user().await;

        let mut source = ScriptSource::new(vec![
            binary_metadata(4),
            UploadFrame::Chunk(STANDARD.encode([1u8, 2, 3, 4])),
            UploadFrame::Chunk(STANDARD.encode([5u8])),
            UploadFrame::End,
        ]);
        let record = svc
            .create_record_stream(user, &mut source)
            .await
            .expect("stream create");
        assert!(record.blob_key.is_some());
        assert_eq!(record.encrypted_chunk_size, 4);

        let mut sink = CollectSink::default();
        svc.stream_record(user, record.id, &mut sink)
            .await
            .expect("stream download");

        assert!(matches!(sink.frames[0], DownloadFrame::Metadata(_)));
        let mut data = Vec::new();
        let mut saw_last = false;
        for frame in &sink.frames[1..] {
            let DownloadFrame::Chunk {
                data: chunk,
                is_last_chunk,
            } = frame
            else {
                panic!("unexpected frame {frame:?}");
            };
            assert!(!saw_last, "chunk after last chunk");
            data.extend_from_slice(&STANDARD.decode(chunk).expect("b64"));
            saw_last = *is_last_chunk;
        }
        assert!(saw_last, "final chunk unmarked");
        assert_eq!(data, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_stream_exact_multiple_marks_last() {
        let (svc, user) = service_with_user().await;
        let mut source = ScriptSource::new(vec![
            binary_metadata(4),
            UploadFrame::Chunk(STANDARD.encode([1u8, 2, 3, 4, 5, 6, 7, 8])),
        ]);
        let record = svc
            .create_record_stream(user, &mut source)
            .await
            .expect("create");

        let mut sink = CollectSink::default();
        svc.stream_record(user, record.id, &mut sink)
            .await
            .expect("download");
        let last = sink.frames.last().expect("frames");
        assert!(matches!(
            last,
            DownloadFrame::Chunk {
                is_last_chunk: true,
                ..
            }
        ));
        assert_eq!(sink.frames.len(), 3); // metadata + 2 chunks
    }

    #[tokio::test]
    async fn test_chunk_before_metadata_is_protocol_violation() {
        let (svc, user) = service_with_user().await;
        let mut source = ScriptSource::new(vec![UploadFrame::Chunk(STANDARD.encode([1u8]))]);
        let err = svc
            .create_record_stream(user, &mut source)
            .await
            .expect_err("violation");
        assert!(matches!(err, ServiceError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_no_metadata_within_limit_fails() {
        let (svc, user) = service_with_user().await;
        let frames = vec![UploadFrame::Chunk(String::new()); METADATA_FRAME_LIMIT + 1];
        let mut source = ScriptSource::new(frames);
        let err = svc
            .create_record_stream(user, &mut source)
            .await
            .expect_err("no metadata");
        match err {
            ServiceError::InvalidArgument(msg) => assert!(msg.contains("metadata not received")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_stream_end_before_metadata_fails() {
        let (svc, user) = service_with_user().await;
        let mut source = ScriptSource::new(vec![]);
        let err = svc
            .create_record_stream(user, &mut source)
            .await
            .expect_err("closed early");
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_binary_chunk_size_zero_rejected() {
        let (svc, user) = service_with_user().await;
        let mut source = ScriptSource::new(vec![binary_metadata(0)]);
        let err = svc
            .create_record_stream(user, &mut source)
            .await
            .expect_err("chunk size");
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_duplicate_metadata_ignored() {
        let (svc, user) = service_with_user().await;
        let mut source = ScriptSource::new(vec![
            binary_metadata(4),
            binary_metadata(9), // ignored, not last-writer-wins
            UploadFrame::Chunk(STANDARD.encode([7u8])),
        ]);
        let record = svc
            .create_record_stream(user, &mut source)
            .await
            .expect("create");
        assert_eq!(record.encrypted_chunk_size, 4);
    }

    #[tokio::test]
    async fn test_cancelled_stream_commits_nothing() {
        let (svc, user) = service_with_user().await;
        let mut source = ScriptSource::with_tail_error(
            vec![
                binary_metadata(4),
                UploadFrame::Chunk(STANDARD.encode([1u8, 2])),
            ],
            StreamError::Cancelled,
        );
        let err = svc
            .create_record_stream(user, &mut source)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ServiceError::Cancelled));

        let listed = svc.list_records(user, None).await.expect("list");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_stream_download_small_record_has_no_data() {
        let (svc, user) = service_with_user().await;
        let record = svc.create_record(small_params(user)).await.expect("create");

        let mut sink = CollectSink::default();
        let err = svc
            .stream_record(user, record.id, &mut sink)
            .await
            .expect_err("no blob");
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        // Metadata still went out first.
        assert_eq!(sink.frames.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_then_delta_serves_tombstone() {
        let (svc, user) = service_with_user().await;
        let r1 = svc.create_record(small_params(user)).await.expect("r1");
        let mut note = small_params(user);
        note.record_type = RecordType::Note;
        svc.create_record(note).await.expect("r2");

        svc.delete_record(user, r1.id).await.expect("delete");

        let delta = svc
            .list_delta(user, Some(RecordType::Login), 0, true)
            .await
            .expect("delta");
        assert!(delta.records.is_empty());
        assert_eq!(delta.tombstones.len(), 1);
        assert_eq!(delta.tombstones[0].id, r1.id);
        assert!(delta.server_time >= delta.tombstones[0].deleted_at);
    }

    #[tokio::test]
    async fn test_delta_server_time_covers_records() {
        let (svc, user) = service_with_user().await;
        for _ in 0..3 {
            svc.create_record(small_params(user)).await.expect("create");
        }
        let delta = svc.list_delta(user, None, 0, false).await.expect("delta");
        assert_eq!(delta.records.len(), 3);
        let max_updated = delta.records.iter().map(|r| r.updated_at).max().expect("max");
        assert!(delta.server_time >= max_updated);
        // Ascending order by update time.
        for pair in delta.records.windows(2) {
            assert!(pair[0].updated_at <= pair[1].updated_at);
        }
    }

    #[tokio::test]
    async fn test_idempotent_create_keeps_first_payload() {
        let (svc, user) = service_with_user().await;
        let request_id = Uuid::new_v4();

        let mut first = small_params(user);
        first.request_id = Some(request_id);
        let created = svc.create_record(first).await.expect("first");

        let mut replay = small_params(user);
        replay.request_id = Some(request_id);
        replay.name = "m".to_string();
        replay.encrypted_data = b"Y".to_vec();
        let replayed = svc.create_record(replay).await.expect("replay");

        assert_eq!(replayed.id, created.id);
        assert_eq!(replayed.encrypted_data, Some(b"X".to_vec()));
        assert_eq!(replayed.name, "n");
    }

    #[tokio::test]
    async fn test_delete_requires_ownership() {
        let (svc, user) = service_with_user().await;
        let record = svc.create_record(small_params(user)).await.expect("create");
        let err = svc
            .delete_record(Uuid::new_v4(), record.id)
            .await
            .expect_err("not owner");
        assert!(matches!(err, ServiceError::NotFound));
        // Still there for the owner.
        svc.get_record(user, record.id).await.expect("still present");
    }
}
