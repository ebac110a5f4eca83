//! Idempotent relocation of one object between store keys.
//!
//! The executor performs the existence-check / copy / delete dance against
//! the store and nothing else: the catalog pointer is updated by the caller,
//! and only after a durable outcome (`Moved` or `DestinationExists`). That
//! ordering is what keeps a crash mid-relocate from leaving the catalog
//! pointing at a key that holds nothing.

use crate::services::object_store::{ObjectStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Everything one relocate attempt needs. Computed, never stored.
#[derive(Clone, Debug)]
pub struct RelocatePlan {
    pub source_key: String,
    pub destination_key: String,
    /// Content type set explicitly on the destination rather than inherited.
    pub content_type: Option<String>,
    /// Size the catalog records for the object, used to verify that an
    /// already-present destination really is this object.
    pub expected_size: Option<i64>,
}

/// Terminal states of one relocate attempt. None of these are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocateOutcome {
    /// Source copied to destination and deleted.
    Moved,
    /// Source and destination were the same key. No remote call was made.
    AlreadyInPlace,
    /// The source does not exist; caller records and skips.
    SourceMissing,
    /// The destination already existed (verified) and was kept; the source
    /// was deleted. Resolves a previous run that copied but failed to delete.
    DestinationExists,
}

#[derive(Debug, Error)]
pub enum RelocateError {
    /// The destination key is occupied by what appears to be a different
    /// object. Neither source nor destination was touched.
    #[error("destination `{key}` holds {actual} bytes, expected {expected}")]
    DestinationMismatch {
        key: String,
        actual: i64,
        expected: i64,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs [`RelocatePlan`]s against an object store.
#[derive(Clone)]
pub struct MoveExecutor {
    store: Arc<dyn ObjectStore>,
}

impl MoveExecutor {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Execute one relocate.
    ///
    /// Safe to re-run after a crash at any point: the destination check makes
    /// the copy idempotent, and deleting an already-deleted source is
    /// success. Two racing runs on the same object settle on the destination
    /// because destination-exists is a terminal non-error state.
    pub async fn relocate(&self, plan: &RelocatePlan) -> Result<RelocateOutcome, RelocateError> {
        if plan.source_key == plan.destination_key {
            return Ok(RelocateOutcome::AlreadyInPlace);
        }

        if let Some(stat) = self.store.head_object(&plan.destination_key).await? {
            if let Some(expected) = plan.expected_size {
                if stat.size_bytes != expected {
                    return Err(RelocateError::DestinationMismatch {
                        key: plan.destination_key.clone(),
                        actual: stat.size_bytes,
                        expected,
                    });
                }
            }
            // Destination is authoritative; clear the leftover source.
            self.store.delete_object(&plan.source_key).await?;
            debug!(
                "destination {} already present, removed source {}",
                plan.destination_key, plan.source_key
            );
            return Ok(RelocateOutcome::DestinationExists);
        }

        if self.store.head_object(&plan.source_key).await?.is_none() {
            return Ok(RelocateOutcome::SourceMissing);
        }

        self.store
            .copy_object(
                &plan.source_key,
                &plan.destination_key,
                plan.content_type.as_deref(),
            )
            .await?;
        self.store.delete_object(&plan.source_key).await?;
        debug!("moved {} -> {}", plan.source_key, plan.destination_key);
        Ok(RelocateOutcome::Moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::{BodyStream, FsObjectStore};
    use bytes::Bytes;
    use futures::{StreamExt, stream};

    fn body(bytes: &'static [u8]) -> BodyStream {
        stream::iter(vec![Ok(Bytes::from_static(bytes))]).boxed()
    }

    fn plan(src: &str, dst: &str, expected_size: Option<i64>) -> RelocatePlan {
        RelocatePlan {
            source_key: src.into(),
            destination_key: dst.into(),
            content_type: Some("application/pdf".into()),
            expected_size,
        }
    }

    async fn harness() -> (tempfile::TempDir, Arc<FsObjectStore>, MoveExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsObjectStore::new(dir.path()));
        let executor = MoveExecutor::new(store.clone());
        (dir, store, executor)
    }

    #[tokio::test]
    async fn same_key_is_a_noop() {
        let (_dir, _store, executor) = harness().await;
        // No object exists at all; the short-circuit fires before any call.
        let outcome = executor.relocate(&plan("same.pdf", "same.pdf", None)).await.unwrap();
        assert_eq!(outcome, RelocateOutcome::AlreadyInPlace);
    }

    #[tokio::test]
    async fn moves_and_deletes_the_source() {
        let (_dir, store, executor) = harness().await;
        store.put_object("abc123.pdf", None, body(b"content")).await.unwrap();

        let outcome = executor
            .relocate(&plan("abc123.pdf", "course-x/mod-2/notes.pdf", Some(7)))
            .await
            .unwrap();
        assert_eq!(outcome, RelocateOutcome::Moved);
        assert!(store.head_object("abc123.pdf").await.unwrap().is_none());
        assert!(store.head_object("course-x/mod-2/notes.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_source_is_reported_not_fatal() {
        let (_dir, _store, executor) = harness().await;
        let outcome = executor.relocate(&plan("gone.pdf", "dst.pdf", None)).await.unwrap();
        assert_eq!(outcome, RelocateOutcome::SourceMissing);
    }

    #[tokio::test]
    async fn existing_destination_wins_and_source_is_cleared() {
        let (_dir, store, executor) = harness().await;
        // A previous run copied but crashed before deleting the source.
        store.put_object("old.pdf", None, body(b"same bytes")).await.unwrap();
        store.put_object("new/notes.pdf", None, body(b"same bytes")).await.unwrap();

        let outcome = executor
            .relocate(&plan("old.pdf", "new/notes.pdf", Some(10)))
            .await
            .unwrap();
        assert_eq!(outcome, RelocateOutcome::DestinationExists);
        assert!(store.head_object("old.pdf").await.unwrap().is_none());
        assert!(store.head_object("new/notes.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn size_mismatch_touches_nothing() {
        let (_dir, store, executor) = harness().await;
        store.put_object("old.pdf", None, body(b"mine")).await.unwrap();
        store.put_object("new/notes.pdf", None, body(b"someone else's")).await.unwrap();

        let err = executor
            .relocate(&plan("old.pdf", "new/notes.pdf", Some(4)))
            .await
            .unwrap_err();
        assert!(matches!(err, RelocateError::DestinationMismatch { .. }));
        assert!(store.head_object("old.pdf").await.unwrap().is_some());
        assert!(store.head_object("new/notes.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rerun_after_partial_move_converges() {
        let (_dir, store, executor) = harness().await;
        store.put_object("src.pdf", None, body(b"bytes")).await.unwrap();
        let p = plan("src.pdf", "dst/notes.pdf", Some(5));

        assert_eq!(executor.relocate(&p).await.unwrap(), RelocateOutcome::Moved);
        // Second run: destination present, source gone.
        assert_eq!(
            executor.relocate(&p).await.unwrap(),
            RelocateOutcome::DestinationExists
        );
        assert!(store.head_object("dst/notes.pdf").await.unwrap().is_some());
    }
}
