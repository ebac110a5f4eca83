//! Upload orchestrator: computes destinations before bytes move.
//!
//! On a validated write carrying N files, the orchestrator resolves the
//! owner's lineage, derives the target folder, queues one [`FileContext`] per
//! file in upload order on a fresh request-scoped [`UploadContext`], and only
//! then delegates each file to the provider. The provider therefore knows the
//! correct destination before it touches the stream, which is the whole point
//! of the context channel.

use crate::context::{FileContext, UploadContext};
use crate::keys::{sanitize, sanitize_file_name};
use crate::models::object::StoredObject;
use crate::services::catalog::{CatalogError, CatalogService};
use crate::services::provider::{IncomingFile, ProviderError, StorageProvider};
use crate::services::object_store::BodyStream;
use tracing::debug;
use uuid::Uuid;

/// One file of a write request, with the slot it should fill on the owner.
pub struct PendingUpload {
    pub slot: String,
    pub file: IncomingFile,
    pub body: BodyStream,
}

/// Drives the context channel for one write request at a time.
#[derive(Clone)]
pub struct UploadOrchestrator {
    provider: StorageProvider,
    catalog: CatalogService,
}

impl UploadOrchestrator {
    pub fn new(provider: StorageProvider, catalog: CatalogService) -> Self {
        Self { provider, catalog }
    }

    /// Store `uploads` for `owner_id`, naming each by the owner's lineage,
    /// and record one link per filled slot.
    ///
    /// Same-name uploads into the same folder overwrite, mirroring the
    /// store's put semantics; distinct objects that later collide on a name
    /// are separated by the reconciler's hash disambiguation.
    pub async fn attach_to_entity(
        &self,
        owner_id: Uuid,
        owner_kind: &str,
        uploads: Vec<PendingUpload>,
    ) -> Result<Vec<StoredObject>, ProviderError> {
        let lineage = self.catalog.lineage_titles(owner_id).await?;
        if lineage.is_empty() {
            return Err(ProviderError::Catalog(CatalogError::EntityNotFound(owner_id)));
        }
        let target_path = lineage
            .iter()
            .map(|title| sanitize(title))
            .collect::<Vec<_>>()
            .join("/");

        // Establish the request scope up front, in upload order.
        let mut scope = UploadContext::new();
        scope.establish(uploads.iter().map(|upload| {
            FileContext::new(
                target_path.clone(),
                sanitize_file_name(&upload.file.original_name),
            )
        }));
        debug!(
            "established {} file context(s) under {} for entity {}",
            scope.len(),
            target_path,
            owner_id
        );

        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let object = self
                .provider
                .store_incoming(&mut scope, &upload.file, upload.body)
                .await?;
            self.catalog
                .insert_link(object.id, owner_id, owner_kind, &upload.slot)
                .await?;
            stored.push(object);
        }
        Ok(stored)
    }
}
