//! Batch reconciliation: walk the catalog, recompute canonical keys, and
//! bring the store in line.
//!
//! Two independent passes. The relocation pass asks the resolver where each
//! linked object currently lives, the path builder where it should live, and
//! the move executor to close any gap, updating the catalog pointer only
//! after a durable outcome. The hygiene pass removes orphaned, dangling and
//! duplicate link rows. Both passes support a dry-run mode that reports
//! without mutating, per-item failures are recorded and never abort the
//! batch, and re-running either pass is the retry mechanism: every operation
//! underneath is idempotent.

use crate::keys::{build_target_key, build_target_key_disambiguated};
use crate::models::{link::LinkRecord, object::StoredObject};
use crate::relocate::{MoveExecutor, RelocateError, RelocateOutcome, RelocatePlan};
use crate::resolve::KeyResolver;
use crate::services::catalog::{CatalogError, CatalogService};
use crate::services::object_store::{ObjectStore, StoreError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Compute and report; mutate nothing.
    DryRun,
    /// Mutate store and catalog.
    Execute,
}

/// Counters for one relocation pass.
#[derive(Debug, Default, Serialize)]
pub struct RelocationReport {
    /// Distinct objects considered.
    pub processed: usize,
    /// Relocations confirmed durable this run (including runs that found the
    /// destination already present and cleared the leftover source).
    pub moved: usize,
    /// Objects a dry run would have moved.
    pub would_move: usize,
    /// Canonical key already matched the current key.
    pub already_in_place: usize,
    /// The resolver exhausted every strategy; skipped and flagged.
    pub unresolvable: usize,
    /// Resolved source vanished between resolution and relocate.
    pub source_missing: usize,
    /// Per-item failures; the items remain retryable on a future run.
    pub errored: usize,
    /// True when the pass stopped early on cancellation.
    pub cancelled: bool,
}

/// Counters for one hygiene pass. In dry-run mode the counts are what would
/// be removed.
#[derive(Debug, Default, Serialize)]
pub struct HygieneReport {
    pub orphaned: u64,
    pub dangling: u64,
    pub duplicates: u64,
    pub errored: usize,
}

/// Combined report printed by the CLI.
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub mode: RunMode,
    pub hygiene: HygieneReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocation: Option<RelocationReport>,
}

#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Relocate(#[from] RelocateError),
}

enum ItemOutcome {
    Moved,
    WouldMove,
    AlreadyInPlace,
    Unresolvable,
    SourceMissing,
}

/// Sequential driver over the catalog. One instance per run is fine; it
/// holds no per-pass state.
pub struct Reconciler {
    catalog: CatalogService,
    store: Arc<dyn ObjectStore>,
    resolver: KeyResolver,
    mover: MoveExecutor,
    public_base_url: Option<String>,
}

impl Reconciler {
    pub fn new(
        catalog: CatalogService,
        store: Arc<dyn ObjectStore>,
        resolver: KeyResolver,
        public_base_url: Option<String>,
    ) -> Self {
        let mover = MoveExecutor::new(store.clone());
        Self {
            catalog,
            store,
            resolver,
            mover,
            public_base_url,
        }
    }

    /// Run hygiene, then (unless `hygiene_only`) relocation.
    ///
    /// Hygiene goes first so the relocation pass never sees rows hygiene
    /// would delete. Only setup failures (unreadable catalog) error out;
    /// everything per-item lands in the report.
    pub async fn run(
        &self,
        mode: RunMode,
        hygiene_only: bool,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, CatalogError> {
        let hygiene = self.hygiene_pass(mode).await;
        let relocation = if hygiene_only {
            None
        } else {
            Some(self.relocation_pass(mode, cancel).await?)
        };
        Ok(ReconcileReport {
            mode,
            hygiene,
            relocation,
        })
    }

    /// Relocate every linked object whose current key disagrees with its
    /// canonical key.
    pub async fn relocation_pass(
        &self,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<RelocationReport, CatalogError> {
        let candidates = self.catalog.relocation_candidates().await?;
        let mut report = RelocationReport::default();
        // An object may fill several slots; consider it once per run so at
        // most one move is ever in flight for it.
        let mut seen: BTreeSet<uuid::Uuid> = BTreeSet::new();

        for link in candidates {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if !seen.insert(link.object_id) {
                continue;
            }
            report.processed += 1;
            match self.reconcile_one(&link, mode).await {
                Ok(ItemOutcome::Moved) => report.moved += 1,
                Ok(ItemOutcome::WouldMove) => report.would_move += 1,
                Ok(ItemOutcome::AlreadyInPlace) => report.already_in_place += 1,
                Ok(ItemOutcome::Unresolvable) => report.unresolvable += 1,
                Ok(ItemOutcome::SourceMissing) => report.source_missing += 1,
                Err(err) => {
                    report.errored += 1;
                    warn!("relocation of object {} failed: {}", link.object_id, err);
                }
            }
        }

        info!(
            "relocation pass done: processed={} moved={} would_move={} in_place={} unresolvable={} source_missing={} errored={}",
            report.processed,
            report.moved,
            report.would_move,
            report.already_in_place,
            report.unresolvable,
            report.source_missing,
            report.errored,
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        link: &LinkRecord,
        mode: RunMode,
    ) -> Result<ItemOutcome, ItemError> {
        let object = self.catalog.fetch_object(link.object_id).await?;
        let lineage = self.catalog.lineage_titles(link.owner_id).await?;
        if lineage.is_empty() {
            warn!("object {} has no resolvable lineage, skipping", object.id);
            return Ok(ItemOutcome::Unresolvable);
        }
        let target = build_target_key(&lineage, &object.file_name());

        let Some(current) = self
            .resolver
            .resolve_current_key(self.store.as_ref(), &object)
            .await?
        else {
            warn!("object {} not found under any strategy, skipping", object.id);
            return Ok(ItemOutcome::Unresolvable);
        };

        if current == target {
            // Physically in place; the pointer may still be stale.
            if mode == RunMode::Execute && object.current_key != target {
                self.update_pointer(&object, &target).await?;
            }
            return Ok(ItemOutcome::AlreadyInPlace);
        }

        if mode == RunMode::DryRun {
            info!("would move {} -> {}", current, target);
            return Ok(ItemOutcome::WouldMove);
        }

        let plan = RelocatePlan {
            source_key: current.clone(),
            destination_key: target.clone(),
            content_type: object.content_type.clone(),
            expected_size: Some(object.size_bytes),
        };
        match self.mover.relocate(&plan).await {
            Ok(RelocateOutcome::Moved) | Ok(RelocateOutcome::DestinationExists) => {
                self.update_pointer(&object, &target).await?;
                Ok(ItemOutcome::Moved)
            }
            Ok(RelocateOutcome::AlreadyInPlace) => Ok(ItemOutcome::AlreadyInPlace),
            Ok(RelocateOutcome::SourceMissing) => Ok(ItemOutcome::SourceMissing),
            Err(RelocateError::DestinationMismatch { key, .. }) => {
                // A different object owns the canonical name; fall back to
                // the hash-disambiguated key for this one.
                let alt = build_target_key_disambiguated(
                    &lineage,
                    &object.file_name(),
                    &object.content_hash,
                );
                warn!(
                    "destination {} held by another object, retrying object {} as {}",
                    key, object.id, alt
                );
                if alt == current {
                    return Ok(ItemOutcome::AlreadyInPlace);
                }
                let fallback = RelocatePlan {
                    source_key: current,
                    destination_key: alt.clone(),
                    content_type: object.content_type.clone(),
                    expected_size: Some(object.size_bytes),
                };
                match self.mover.relocate(&fallback).await? {
                    RelocateOutcome::Moved | RelocateOutcome::DestinationExists => {
                        self.update_pointer(&object, &alt).await?;
                        Ok(ItemOutcome::Moved)
                    }
                    RelocateOutcome::AlreadyInPlace => Ok(ItemOutcome::AlreadyInPlace),
                    RelocateOutcome::SourceMissing => Ok(ItemOutcome::SourceMissing),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_pointer(&self, object: &StoredObject, key: &str) -> Result<(), CatalogError> {
        let url = self
            .public_base_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key));
        self.catalog
            .update_object_location(object.id, key, url.as_deref())
            .await
    }

    /// Remove corrupt link rows: orphaned (object gone), dangling (owner
    /// gone), duplicate (same object/owner/slot beyond the first).
    ///
    /// Naturally idempotent; a second run finds nothing left. Failures are
    /// logged and counted, never fatal, so a broken step cannot block the
    /// relocation pass that follows.
    pub async fn hygiene_pass(&self, mode: RunMode) -> HygieneReport {
        let mut report = HygieneReport::default();

        let orphaned = match mode {
            RunMode::DryRun => self.catalog.count_orphaned_links().await,
            RunMode::Execute => self.catalog.delete_orphaned_links().await,
        };
        match orphaned {
            Ok(count) => report.orphaned = count,
            Err(err) => {
                report.errored += 1;
                warn!("hygiene orphaned-links step failed: {}", err);
            }
        }

        let dangling = match mode {
            RunMode::DryRun => self.catalog.count_dangling_links().await,
            RunMode::Execute => self.catalog.delete_dangling_links().await,
        };
        match dangling {
            Ok(count) => report.dangling = count,
            Err(err) => {
                report.errored += 1;
                warn!("hygiene dangling-links step failed: {}", err);
            }
        }

        let duplicates = match mode {
            RunMode::DryRun => self.catalog.count_duplicate_links().await,
            RunMode::Execute => self.catalog.delete_duplicate_links().await,
        };
        match duplicates {
            Ok(count) => report.duplicates = count,
            Err(err) => {
                report.errored += 1;
                warn!("hygiene duplicate-links step failed: {}", err);
            }
        }

        info!(
            "hygiene pass done: orphaned={} dangling={} duplicates={} errored={}",
            report.orphaned, report.dangling, report.duplicates, report.errored,
        );
        report
    }
}
