//! Storage provider: accepts incoming byte streams and names them.
//!
//! The provider is the single place where an uploaded object receives its
//! store key. When the orchestrator has established an [`UploadContext`] for
//! the request, the next queued [`FileContext`] names the object; with no
//! context available the provider falls back to the legacy flat naming
//! convention `{content_hash}.{extension}`, staged first because the hash is
//! only known once the stream has been digested.

use crate::context::UploadContext;
use crate::keys::sanitize;
use crate::models::object::StoredObject;
use crate::services::catalog::{CatalogError, CatalogService};
use crate::services::object_store::{BodyStream, ObjectStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// One file arriving with a write request.
pub struct IncomingFile {
    /// Name as supplied by the uploader, unsanitized.
    pub original_name: String,
    pub content_type: Option<String>,
}

/// Accepts payloads into the store and records them in the catalog.
#[derive(Clone)]
pub struct StorageProvider {
    store: Arc<dyn ObjectStore>,
    catalog: CatalogService,
    public_base_url: Option<String>,
}

impl StorageProvider {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: CatalogService,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            store,
            catalog,
            public_base_url,
        }
    }

    /// Public URL for a key, when a base URL is configured.
    pub fn url_for(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }

    /// Stream one incoming file into the store and record it.
    ///
    /// Consumes at most one entry from `scope`; an empty scope is the
    /// documented fallback to default naming, not an error. The catalog row
    /// is inserted only after the payload is durable under its final key.
    pub async fn store_incoming(
        &self,
        scope: &mut UploadContext,
        file: &IncomingFile,
        body: BodyStream,
    ) -> Result<StoredObject, ProviderError> {
        let (logical_name, extension) = split_name(&file.original_name);

        let (final_key, stat) = match scope.next_context() {
            Some(fc) => {
                let key = fc.key();
                let stat = self
                    .store
                    .put_object(&key, file.content_type.as_deref(), body)
                    .await?;
                (key, stat)
            }
            None => {
                // Hash naming needs the digest, so stage under a throwaway
                // key first and move into place.
                let staging = format!("incoming/.staging-{}", Uuid::new_v4());
                let stat = self
                    .store
                    .put_object(&staging, file.content_type.as_deref(), body)
                    .await?;
                let hash = stat.etag.clone().unwrap_or_default();
                let key = if extension.is_empty() {
                    hash
                } else {
                    format!("{}.{}", hash, extension)
                };
                self.store
                    .copy_object(&staging, &key, file.content_type.as_deref())
                    .await?;
                self.store.delete_object(&staging).await?;
                debug!("no file context queued, defaulted {} to {}", file.original_name, key);
                (key, stat)
            }
        };

        let object = StoredObject {
            id: Uuid::new_v4(),
            logical_name,
            extension,
            content_type: file.content_type.clone(),
            content_hash: stat.etag.unwrap_or_default(),
            url: self.url_for(&final_key),
            current_key: final_key,
            size_bytes: stat.size_bytes,
            last_modified: Utc::now(),
        };
        self.catalog.insert_object(&object).await?;
        Ok(object)
    }
}

/// Split an uploaded name into sanitized `(logical_name, extension)`.
fn split_name(original: &str) -> (String, String) {
    match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            (sanitize(stem), sanitize(ext))
        }
        _ => (sanitize(original), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_sanitizes_both_halves() {
        assert_eq!(split_name("My Notes.PDF"), ("my-notes".into(), "pdf".into()));
        assert_eq!(split_name("plain"), ("plain".into(), String::new()));
        assert_eq!(split_name(""), ("unknown".into(), String::new()));
        assert_eq!(split_name(".hidden"), ("hidden".into(), String::new()));
    }
}
