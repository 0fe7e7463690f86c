//! Represents a stored blob and how it is addressed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Container plus object name, the unit the blob store reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLocation {
    pub container: String,
    pub name: String,
}

impl BlobLocation {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Metadata row kept by the local blob store. The payload itself lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct BlobRecord {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Container the blob belongs to.
    pub container: String,

    /// Object name within the container.
    pub name: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, lowercase hex.
    pub etag: String,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}
