//! src/services/storage_service.rs
//!
//! Blob storage collaborator. `BlobStore` is the seam the event pipeline
//! talks to; `LocalBlobStore` backs it with SQLite for metadata and local
//! disk for payloads sharded beneath
//! `base_path/{container}/{shard}/{shard}/{name}`.

use crate::models::blob::BlobRecord;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("container `{name}` invalid: {reason}")]
    InvalidContainerName { name: String, reason: String },
    #[error("invalid blob name `{0}`")]
    InvalidBlobName(String),
    #[error("blob `{name}` not found in container `{container}`")]
    BlobNotFound { container: String, name: String },
    #[error("blob `{name}` already exists in container `{container}`")]
    BlobAlreadyExists { container: String, name: String },
    #[error("storage operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Whether the same call might succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Cancelled | StorageError::Sqlx(_) => true,
            StorageError::Io(err) => err.kind() != ErrorKind::NotFound,
            StorageError::InvalidContainerName { .. }
            | StorageError::InvalidBlobName(_)
            | StorageError::BlobNotFound { .. }
            | StorageError::BlobAlreadyExists { .. } => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read and write whole blobs by container and name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full payload of a blob into memory.
    async fn download(&self, container: &str, name: &str) -> StorageResult<Bytes>;

    /// Write a blob. With `overwrite` unset an existing blob is an error.
    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: Option<&str>,
        overwrite: bool,
    ) -> StorageResult<()>;
}

const MAX_BLOB_NAME_LEN: usize = 1024;
const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Local blob store: payloads on disk, metadata in SQLite.
#[derive(Clone)]
pub struct LocalBlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,
}

impl LocalBlobStore {
    /// Create a new LocalBlobStore backed by the provided SQLite pool and
    /// using `base_path` as the root directory for payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Reject names that could escape the container directory.
    fn ensure_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidBlobName(name.to_string());
        if name.is_empty() || name.len() > MAX_BLOB_NAME_LEN {
            return Err(invalid());
        }
        if name.starts_with('/') || name.contains("..") {
            return Err(invalid());
        }
        if name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    /// Validate container name format.
    ///
    /// - 3–63 characters
    /// - lowercase letters, digits and hyphens only
    /// - must start and end with a letter or digit
    /// - no consecutive hyphens
    fn ensure_container_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidContainerName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, and hyphens",
            ));
        }

        if name.starts_with('-') || name.ends_with('-') {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("--") {
            return Err(invalid("cannot contain consecutive hyphens"));
        }

        Ok(())
    }

    fn container_root(&self, container: &str) -> PathBuf {
        self.base_path.join(container)
    }

    /// Two-level shard identifiers: first two bytes of MD5(container/name).
    fn blob_shards(container: &str, name: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", container, name));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, container: &str, name: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::blob_shards(container, name);
        let mut path = self.container_root(container);
        path.push(shard_a);
        path.push(shard_b);
        path.push(name);
        path
    }

    /// Metadata for a stored blob.
    pub async fn get_blob_metadata(&self, container: &str, name: &str) -> StorageResult<BlobRecord> {
        self.ensure_container_name_safe(container)?;
        self.ensure_name_safe(name)?;
        self.fetch_record(container, name)
            .await?
            .ok_or_else(|| StorageError::BlobNotFound {
                container: container.to_string(),
                name: name.to_string(),
            })
    }

    async fn fetch_record(&self, container: &str, name: &str) -> StorageResult<Option<BlobRecord>> {
        let record = sqlx::query_as::<_, BlobRecord>(
            "SELECT id, container, name, content_type, size_bytes, etag, last_modified
             FROM blobs WHERE container = ? AND name = ?",
        )
        .bind(container)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    /// Write `data` to a temp file beside `file_path` and fsync it. The
    /// caller renames it into place once metadata is recorded.
    async fn stage_payload(&self, file_path: &Path, data: &[u8]) -> StorageResult<PathBuf> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("blob path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(tmp_path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        let record = self.get_blob_metadata(container, name).await?;

        let file_path = self.blob_path(container, name);
        match fs::read(&file_path).await {
            Ok(data) => {
                debug!(
                    "read {} bytes (etag {}) from {}",
                    data.len(),
                    record.etag,
                    file_path.display()
                );
                Ok(Bytes::from(data))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::BlobNotFound {
                container: container.to_string(),
                name: name.to_string(),
            }),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: Option<&str>,
        overwrite: bool,
    ) -> StorageResult<()> {
        self.ensure_container_name_safe(container)?;
        self.ensure_name_safe(name)?;

        if !overwrite && self.fetch_record(container, name).await?.is_some() {
            return Err(StorageError::BlobAlreadyExists {
                container: container.to_string(),
                name: name.to_string(),
            });
        }

        let file_path = self.blob_path(container, name);
        let tmp_path = self.stage_payload(&file_path, &data).await?;

        let mut digest = Context::new();
        digest.consume(&data);
        let etag = format!("{:x}", digest.compute());

        let upsert = sqlx::query(
            r#"
            INSERT INTO blobs (
                id, container, name, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(container, name) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(container)
        .bind(name)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        if let Err(err) = upsert {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Sqlx(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        debug!("wrote {} bytes to {}", data.len(), file_path.display());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn store() -> (LocalBlobStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = LocalBlobStore::new(Arc::new(pool), dir.path());
        store.migrate().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_payload_and_metadata() {
        let (store, _dir) = store().await;
        store
            .upload("thumbnails", "cat.png", Bytes::from_static(b"png-bytes"), Some("image/png"), true)
            .await
            .unwrap();

        let data = store.download("thumbnails", "cat.png").await.unwrap();
        assert_eq!(&data[..], b"png-bytes");

        let meta = store.get_blob_metadata("thumbnails", "cat.png").await.unwrap();
        assert_eq!(meta.size_bytes, 9);
        assert_eq!(meta.content_type.as_deref(), Some("image/png"));
        assert_eq!(meta.etag, format!("{:x}", md5::compute(b"png-bytes")));
    }

    #[tokio::test]
    async fn overwrite_replaces_payload() {
        let (store, _dir) = store().await;
        store
            .upload("thumbnails", "a.png", Bytes::from_static(b"first"), None, true)
            .await
            .unwrap();
        store
            .upload("thumbnails", "a.png", Bytes::from_static(b"second"), None, true)
            .await
            .unwrap();

        assert_eq!(&store.download("thumbnails", "a.png").await.unwrap()[..], b"second");
        let meta = store.get_blob_metadata("thumbnails", "a.png").await.unwrap();
        assert_eq!(meta.size_bytes, 6);
    }

    #[tokio::test]
    async fn failed_metadata_write_keeps_previous_payload() {
        let (store, _dir) = store().await;
        store
            .upload("thumbnails", "a.png", Bytes::from_static(b"first"), None, true)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER freeze_blobs BEFORE UPDATE ON blobs
             BEGIN SELECT RAISE(ABORT, 'blobs are frozen'); END",
        )
        .execute(&*store.db)
        .await
        .unwrap();

        let err = store
            .upload("thumbnails", "a.png", Bytes::from_static(b"second"), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Sqlx(_)));

        assert_eq!(&store.download("thumbnails", "a.png").await.unwrap()[..], b"first");
        let shard_dir = store.blob_path("thumbnails", "a.png");
        let leftovers = std::fs::read_dir(shard_dir.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn upload_without_overwrite_keeps_existing_blob() {
        let (store, _dir) = store().await;
        store
            .upload("originals", "a.jpg", Bytes::from_static(b"one"), None, false)
            .await
            .unwrap();
        let err = store
            .upload("originals", "a.jpg", Bytes::from_static(b"two"), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BlobAlreadyExists { .. }));
        assert!(!err.is_transient());
        assert_eq!(&store.download("originals", "a.jpg").await.unwrap()[..], b"one");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let (store, _dir) = store().await;
        let err = store.download("originals", "ghost.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::BlobNotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn rejects_unsafe_names() {
        let (store, _dir) = store().await;
        for name in ["", "/etc/passwd", "../escape", "a\\b", "tab\tname"] {
            assert!(
                matches!(
                    store.download("originals", name).await,
                    Err(StorageError::InvalidBlobName(_))
                ),
                "{name:?}"
            );
        }
        for container in ["ab", "Upper", "-lead", "trail-", "dou--ble", "dot.ted"] {
            assert!(
                matches!(
                    store
                        .upload(container, "a.png", Bytes::new(), None, true)
                        .await,
                    Err(StorageError::InvalidContainerName { .. })
                ),
                "{container}"
            );
        }
    }

    #[tokio::test]
    async fn payloads_are_sharded_under_container() {
        let (store, dir) = store().await;
        store
            .upload("thumbnails", "x.png", Bytes::from_static(b"x"), None, true)
            .await
            .unwrap();
        let (a, b) = LocalBlobStore::blob_shards("thumbnails", "x.png");
        assert!(dir.path().join("thumbnails").join(a).join(b).join("x.png").is_file());
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let (store, _dir) = store().await;
        assert_eq!(store.migrate().await.unwrap(), 2);
    }

    #[test]
    fn transient_classification() {
        assert!(StorageError::Cancelled.is_transient());
        assert!(StorageError::Io(io::Error::other("reset")).is_transient());
        assert!(!StorageError::Io(io::Error::from(ErrorKind::NotFound)).is_transient());
        assert!(!StorageError::InvalidBlobName("x".into()).is_transient());
    }
}
