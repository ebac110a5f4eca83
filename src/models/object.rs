//! Represents a binary object stored in the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata record for one stored blob.
///
/// `current_key` is the single source of truth for the object's location in
/// the store. It is mutated in exactly two places: initial placement by the
/// storage provider, and a pointer update after the move executor confirms a
/// relocate as durable.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Sanitized name without extension (e.g. "notes").
    pub logical_name: String,

    /// File extension without the dot, empty when the upload had none.
    pub extension: String,

    /// Content type (MIME type) recorded at upload.
    pub content_type: Option<String>,

    /// MD5 digest of the payload, hex-encoded.
    pub content_hash: String,

    /// Path-like key inside the remote store.
    pub current_key: String,

    /// Public URL derived from the configured base URL, if one is set.
    pub url: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Timestamp of the last placement or relocate.
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    /// File name the object should carry inside any folder, extension
    /// included.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.logical_name.clone()
        } else {
            format!("{}.{}", self.logical_name, self.extension)
        }
    }
}
