//! Multi-store synchronization.
//!
//! [`StoreSyncOrchestrator`] fans one populate or erase operation out to the
//! requested stores. Each store is an independent unit of work: they run
//! concurrently, a failure in one never stops the others, and every unit
//! ends as exactly one [`SyncResult`]. The overall status is a pure fold
//! over those results ([`OverallStatus::from_results`]).
//!
//! # Lifecycle of one operation
//!
//! ```text
//! Idle → Dispatching → Awaiting → Aggregating → Reported
//! ```
//!
//! Only misuse is returned as an `Err`: a requested store with no
//! capability, duplicate identifiers in a populate batch, an empty key list
//! on erase. Everything that goes wrong while talking to a store is
//! captured in that store's result.
//!
//! # Cancellation
//!
//! A unit that has not started when the token fires is reported as skipped
//! ("not attempted"). A unit in flight stops at its next suspension point
//! and is reported as failed with whatever count it had reached.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::chunk::{chunk, chunk_count};
use crate::config::Config;
use crate::embedding::weighted::EmbeddingGenerator;
use crate::embedding::TextEncoder;
use crate::error::{Result, SyncError};
use crate::key::{derive_key, object_key, object_key_for, DEFAULT_THUMBNAIL_PREFIX};
use crate::models::{Isbn13, Record, ThumbnailRef};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::thumbnails::{ThumbnailTransferPipeline, TransferReport};
use crate::traits::{
    DeleteCriteria, DocumentStore, HttpFetch, IndexVector, ObjectStore, StoreKind, VectorIndex,
};
use crate::weights::FieldWeightTable;

// ═══════════════════════════════════════════════════════════════════════
// Capabilities and settings
// ═══════════════════════════════════════════════════════════════════════

/// The external systems one orchestrator talks to.
///
/// Constructed by the caller for each invocation and dropped with the
/// orchestrator, which closes any clients they hold. A store whose
/// capability is absent cannot be targeted.
#[derive(Default, Clone)]
pub struct Capabilities {
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub fetch: Option<Arc<dyn HttpFetch>>,
    pub document_store: Option<Arc<dyn DocumentStore>>,
    pub vector_index: Option<Arc<dyn VectorIndex>>,
    pub encoder: Option<Arc<dyn TextEncoder>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object_store(
        mut self,
        store: Arc<dyn ObjectStore>,
        fetch: Arc<dyn HttpFetch>,
    ) -> Self {
        self.object_store = Some(store);
        self.fetch = Some(fetch);
        self
    }

    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    pub fn with_vector_index(
        mut self,
        index: Arc<dyn VectorIndex>,
        encoder: Arc<dyn TextEncoder>,
    ) -> Self {
        self.vector_index = Some(index);
        self.encoder = Some(encoder);
        self
    }
}

/// Batch and concurrency limits for one orchestrator.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub transfer_concurrency: usize,
    pub document_batch_size: usize,
    pub vector_batch_size: usize,
    /// Records embedded per generator call; bounds memory held by vectors
    /// awaiting upsert.
    pub record_chunk_size: usize,
    pub encoder_batch_size: usize,
    pub thumbnail_prefix: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            transfer_concurrency: crate::thumbnails::DEFAULT_CONCURRENCY,
            document_batch_size: 1000,
            vector_batch_size: 100,
            record_chunk_size: 1000,
            encoder_batch_size: 64,
            thumbnail_prefix: DEFAULT_THUMBNAIL_PREFIX.to_string(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transfer_concurrency: config.sync.transfer_concurrency,
            document_batch_size: config.sync.document_batch_size,
            vector_batch_size: config.sync.vector_batch_size,
            record_chunk_size: config.sync.record_chunk_size,
            encoder_batch_size: config.embedding.batch_size,
            thumbnail_prefix: config.sync.thumbnail_prefix.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let sizes = [
            ("transfer concurrency", self.transfer_concurrency),
            ("document batch size", self.document_batch_size),
            ("vector batch size", self.vector_batch_size),
            ("record chunk size", self.record_chunk_size),
            ("encoder batch size", self.encoder_batch_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(SyncError::invalid(format!("{} must be >= 1", name)));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Ok,
    Failed,
    Skipped,
}

/// Outcome of one store's unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub store: StoreKind,
    pub status: SyncStatus,
    /// Items written or deleted.
    pub count: usize,
    pub error: Option<String>,
    /// Object keys whose thumbnail transfer failed, for a targeted retry.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_keys: Vec<String>,
}

impl SyncResult {
    fn ok(store: StoreKind, count: usize) -> Self {
        Self {
            store,
            status: SyncStatus::Ok,
            count,
            error: None,
            failed_keys: Vec::new(),
        }
    }

    fn failed(store: StoreKind, count: usize, error: &SyncError) -> Self {
        Self {
            store,
            status: SyncStatus::Failed,
            count,
            error: Some(error.to_string()),
            failed_keys: Vec::new(),
        }
    }

    /// The store was not part of the request.
    fn not_requested(store: StoreKind) -> Self {
        Self {
            store,
            status: SyncStatus::Skipped,
            count: 0,
            error: None,
            failed_keys: Vec::new(),
        }
    }

    /// The store was requested but cancellation came first.
    fn not_attempted(store: StoreKind) -> Self {
        Self {
            store,
            status: SyncStatus::Skipped,
            count: 0,
            error: Some("not attempted: operation cancelled".to_string()),
            failed_keys: Vec::new(),
        }
    }

    fn was_requested(&self) -> bool {
        !(self.status == SyncStatus::Skipped && self.error.is_none())
    }

    pub fn is_ok(&self) -> bool {
        self.status == SyncStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    FullSuccess,
    PartialSuccess,
    TotalFailure,
    NoTargets,
}

impl OverallStatus {
    /// Fold per-store results into the overall status.
    ///
    /// Stores that were not requested are ignored; a requested store that
    /// was skipped counts as not succeeded.
    pub fn from_results(results: &[SyncResult]) -> Self {
        let (requested, ok) = results
            .iter()
            .filter(|r| r.was_requested())
            .fold((0usize, 0usize), |(n, ok), r| (n + 1, ok + r.is_ok() as usize));

        match (requested, ok) {
            (0, _) => OverallStatus::NoTargets,
            (n, ok) if ok == n => OverallStatus::FullSuccess,
            (_, 0) => OverallStatus::TotalFailure,
            _ => OverallStatus::PartialSuccess,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::FullSuccess => "full_success",
            OverallStatus::PartialSuccess => "partial_success",
            OverallStatus::TotalFailure => "total_failure",
            OverallStatus::NoTargets => "no_targets",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Populate,
    Erase,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Populate => "populate",
            Operation::Erase => "erase",
        }
    }
}

/// Everything one populate or erase call produced.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub status: OverallStatus,
    /// One entry per store, in [`StoreKind::ALL`] order.
    pub results: Vec<SyncResult>,
    pub elapsed_ms: u64,
}

impl OperationReport {
    fn new(operation: Operation, results: Vec<SyncResult>, started: Instant) -> Self {
        Self {
            operation,
            status: OverallStatus::from_results(&results),
            results,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn no_targets(operation: Operation, started: Instant) -> Self {
        let results = StoreKind::ALL
            .iter()
            .map(|s| SyncResult::not_requested(*s))
            .collect();
        Self::new(operation, results, started)
    }

    pub fn result(&self, store: StoreKind) -> Option<&SyncResult> {
        self.results.iter().find(|r| r.store == store)
    }

    /// Requested stores that did not finish successfully.
    pub fn failed_stores(&self) -> Vec<StoreKind> {
        self.results
            .iter()
            .filter(|r| r.was_requested() && !r.is_ok())
            .map(|r| r.store)
            .collect()
    }
}

/// What an erase removes.
#[derive(Debug, Clone, PartialEq)]
pub enum EraseScope {
    /// Every thumbnail under the prefix, every document, every vector.
    All,
    /// Only the listed records.
    Keys(Vec<Isbn13>),
}

#[derive(Debug, Clone, Copy)]
enum OperationPhase {
    Dispatching,
    Awaiting,
    Aggregating,
    Reported,
}

fn enter(operation: Operation, phase: OperationPhase) {
    tracing::debug!(?operation, ?phase, "operation phase");
}

// ═══════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════

pub struct StoreSyncOrchestrator {
    caps: Capabilities,
    settings: SyncSettings,
    weights: Arc<FieldWeightTable>,
    progress: Arc<dyn ProgressReporter>,
}

impl StoreSyncOrchestrator {
    /// Fails with `InvalidArgument` when any batch or concurrency size is 0.
    pub fn new(caps: Capabilities, settings: SyncSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            caps,
            settings,
            weights: Arc::new(FieldWeightTable::default()),
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_weights(mut self, weights: Arc<FieldWeightTable>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Write `records` to every store in `targets`.
    pub async fn populate(
        &self,
        records: &[Record],
        targets: &[StoreKind],
        cancel: &CancellationToken,
    ) -> Result<OperationReport> {
        let started = Instant::now();
        let targets: BTreeSet<StoreKind> = targets.iter().copied().collect();
        if targets.is_empty() {
            tracing::info!("populate: no targets specified");
            return Ok(OperationReport::no_targets(Operation::Populate, started));
        }

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.isbn.as_str())) {
            return Err(SyncError::invalid(format!(
                "duplicate isbn_13 {} in populate batch",
                dup.isbn
            )));
        }

        let pipeline = match required(&targets, StoreKind::ObjectStore, &self.caps.object_store)? {
            Some(store) => {
                let fetch = self
                    .caps
                    .fetch
                    .clone()
                    .ok_or_else(|| missing(StoreKind::ObjectStore))?;
                Some(
                    ThumbnailTransferPipeline::new(fetch, store, self.settings.transfer_concurrency)?
                        .with_prefix(self.settings.thumbnail_prefix.clone())
                        .with_progress(Arc::clone(&self.progress)),
                )
            }
            None => None,
        };
        let documents = required(&targets, StoreKind::DocumentStore, &self.caps.document_store)?;
        let vectors = match required(&targets, StoreKind::VectorIndex, &self.caps.vector_index)? {
            Some(index) => {
                let encoder = self
                    .caps
                    .encoder
                    .clone()
                    .ok_or_else(|| missing(StoreKind::VectorIndex))?;
                let generator = EmbeddingGenerator::new(
                    encoder,
                    Arc::clone(&self.weights),
                    self.settings.encoder_batch_size,
                )?;
                Some((index, generator))
            }
            None => None,
        };

        tracing::info!(
            records = records.len(),
            targets = ?targets,
            "populate started"
        );
        enter(Operation::Populate, OperationPhase::Dispatching);

        let object_unit = async {
            match &pipeline {
                Some(p) => self.populate_objects(p, records, cancel).await,
                None => SyncResult::not_requested(StoreKind::ObjectStore),
            }
        };
        let document_unit = async {
            match &documents {
                Some(store) => {
                    self.unit(
                        StoreKind::DocumentStore,
                        cancel,
                        self.populate_documents(store.as_ref(), records, cancel),
                    )
                    .await
                }
                None => SyncResult::not_requested(StoreKind::DocumentStore),
            }
        };
        let vector_unit = async {
            match &vectors {
                Some((index, generator)) => {
                    self.unit(
                        StoreKind::VectorIndex,
                        cancel,
                        self.populate_vectors(index.as_ref(), generator, records, cancel),
                    )
                    .await
                }
                None => SyncResult::not_requested(StoreKind::VectorIndex),
            }
        };

        enter(Operation::Populate, OperationPhase::Awaiting);
        let (object, document, vector) = tokio::join!(object_unit, document_unit, vector_unit);

        Ok(self.finish(Operation::Populate, vec![object, document, vector], started))
    }

    /// Remove records from every store in `targets`.
    pub async fn erase(
        &self,
        scope: &EraseScope,
        targets: &[StoreKind],
        cancel: &CancellationToken,
    ) -> Result<OperationReport> {
        let started = Instant::now();
        let targets: BTreeSet<StoreKind> = targets.iter().copied().collect();
        if targets.is_empty() {
            tracing::info!("erase: no targets specified");
            return Ok(OperationReport::no_targets(Operation::Erase, started));
        }
        if let EraseScope::Keys(keys) = scope {
            if keys.is_empty() {
                return Err(SyncError::invalid("erase by key requires at least one key"));
            }
        }

        let objects = required(&targets, StoreKind::ObjectStore, &self.caps.object_store)?;
        let documents = required(&targets, StoreKind::DocumentStore, &self.caps.document_store)?;
        let vectors = required(&targets, StoreKind::VectorIndex, &self.caps.vector_index)?;

        tracing::info!(scope = ?scope, targets = ?targets, "erase started");
        enter(Operation::Erase, OperationPhase::Dispatching);

        let object_unit = async {
            match &objects {
                Some(store) => {
                    self.unit(
                        StoreKind::ObjectStore,
                        cancel,
                        self.erase_objects(store.as_ref(), scope, cancel),
                    )
                    .await
                }
                None => SyncResult::not_requested(StoreKind::ObjectStore),
            }
        };
        let document_unit = async {
            match &documents {
                Some(store) => {
                    self.unit(
                        StoreKind::DocumentStore,
                        cancel,
                        self.erase_documents(store.as_ref(), scope, cancel),
                    )
                    .await
                }
                None => SyncResult::not_requested(StoreKind::DocumentStore),
            }
        };
        let vector_unit = async {
            match &vectors {
                Some(index) => {
                    self.unit(
                        StoreKind::VectorIndex,
                        cancel,
                        self.erase_vectors(index.as_ref(), scope, cancel),
                    )
                    .await
                }
                None => SyncResult::not_requested(StoreKind::VectorIndex),
            }
        };

        enter(Operation::Erase, OperationPhase::Awaiting);
        let (object, document, vector) = tokio::join!(object_unit, document_unit, vector_unit);

        Ok(self.finish(Operation::Erase, vec![object, document, vector], started))
    }

    fn finish(
        &self,
        operation: Operation,
        results: Vec<SyncResult>,
        started: Instant,
    ) -> OperationReport {
        enter(operation, OperationPhase::Aggregating);
        let report = OperationReport::new(operation, results, started);
        for r in report.results.iter().filter(|r| r.was_requested()) {
            match &r.error {
                None => tracing::info!(store = %r.store, count = r.count, "store finished"),
                Some(e) => tracing::warn!(store = %r.store, count = r.count, "store failed: {}", e),
            }
        }
        tracing::info!(
            status = report.status.as_str(),
            elapsed_ms = report.elapsed_ms,
            "{} finished",
            operation.as_str()
        );
        enter(operation, OperationPhase::Reported);
        report
    }

    /// Run one store's unit of work, turning its outcome into a result.
    /// `work` is not polled when cancellation has already fired.
    async fn unit(
        &self,
        store: StoreKind,
        cancel: &CancellationToken,
        work: impl Future<Output = UnitOutcome>,
    ) -> SyncResult {
        if cancel.is_cancelled() {
            return SyncResult::not_attempted(store);
        }
        tracing::debug!(store = %store, "unit started");
        let (count, result) = work.await;
        match result {
            Ok(()) => SyncResult::ok(store, count),
            Err(e) => SyncResult::failed(store, count, &e),
        }
    }

    // ── populate units ──────────────────────────────────────────────

    async fn populate_objects(
        &self,
        pipeline: &ThumbnailTransferPipeline,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> SyncResult {
        let store = StoreKind::ObjectStore;
        if cancel.is_cancelled() {
            return SyncResult::not_attempted(store);
        }
        tracing::debug!(store = %store, "unit started");
        let report = pipeline.transfer(records, cancel).await;
        transfer_result(&report, cancel.is_cancelled())
    }

    async fn populate_documents(
        &self,
        store: &dyn DocumentStore,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let kind = StoreKind::DocumentStore;
        let rows: Vec<Record> = records
            .iter()
            .map(|r| {
                let mut row = r.clone();
                row.thumbnail = ThumbnailRef::Key(object_key(&self.settings.thumbnail_prefix, r));
                row
            })
            .collect();

        let total = rows.len() as u64;
        tracing::debug!(
            rows = rows.len(),
            batches = chunk_count(rows.len(), self.settings.document_batch_size),
            "writing documents"
        );
        let mut inserted = 0;
        let result: Result<()> = async {
            for batch in chunk(&rows, self.settings.document_batch_size)? {
                inserted += call(kind, cancel, store.bulk_insert(batch)).await?;
                self.report(kind, inserted, total);
            }
            Ok(())
        }
        .await;
        (inserted, result)
    }

    async fn populate_vectors(
        &self,
        index: &dyn VectorIndex,
        generator: &EmbeddingGenerator,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let kind = StoreKind::VectorIndex;
        let total = records.len() as u64;
        let mut upserted = 0;
        let result: Result<()> = async {
            for record_chunk in chunk(records, self.settings.record_chunk_size)? {
                let vectors = cancellable(cancel, generator.embed(record_chunk)).await?;
                let entries: Vec<IndexVector> = record_chunk
                    .iter()
                    .zip(vectors)
                    .map(|(r, v)| index_vector(r, v))
                    .collect();

                for batch in chunk(&entries, self.settings.vector_batch_size)? {
                    upserted += call(kind, cancel, index.upsert(batch)).await?;
                    self.report(kind, upserted, total);
                }
            }
            Ok(())
        }
        .await;
        (upserted, result)
    }

    // ── erase units ─────────────────────────────────────────────────

    async fn erase_objects(
        &self,
        store: &dyn ObjectStore,
        scope: &EraseScope,
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let kind = StoreKind::ObjectStore;
        let prefix = &self.settings.thumbnail_prefix;
        let result = match scope {
            EraseScope::All => call(kind, cancel, store.delete_all(prefix)).await,
            EraseScope::Keys(isbns) => {
                let keys: Vec<String> = isbns
                    .iter()
                    .map(|isbn| object_key_for(prefix, isbn.as_str()))
                    .collect();
                call(kind, cancel, store.delete(&keys)).await
            }
        };
        match result {
            Ok(removed) => (removed, Ok(())),
            Err(e) => (0, Err(e)),
        }
    }

    async fn erase_documents(
        &self,
        store: &dyn DocumentStore,
        scope: &EraseScope,
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let kind = StoreKind::DocumentStore;
        let mut removed = 0;
        let result: Result<()> = async {
            match scope {
                EraseScope::All => {
                    removed = call(kind, cancel, store.bulk_delete(&DeleteCriteria::All)).await?;
                }
                EraseScope::Keys(isbns) => {
                    for batch in chunk(isbns, self.settings.document_batch_size)? {
                        let criteria = DeleteCriteria::Isbns(batch.to_vec());
                        removed += call(kind, cancel, store.bulk_delete(&criteria)).await?;
                    }
                }
            }
            Ok(())
        }
        .await;
        (removed, result)
    }

    async fn erase_vectors(
        &self,
        index: &dyn VectorIndex,
        scope: &EraseScope,
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let kind = StoreKind::VectorIndex;
        let mut removed = 0;
        let result: Result<()> = async {
            match scope {
                EraseScope::All => call(kind, cancel, index.delete_all()).await?,
                EraseScope::Keys(isbns) => {
                    let ids: Vec<String> = isbns.iter().map(|i| i.as_str().to_string()).collect();
                    for batch in chunk(&ids, self.settings.vector_batch_size)? {
                        removed += call(kind, cancel, index.delete(batch)).await?;
                    }
                }
            }
            Ok(())
        }
        .await;
        (removed, result)
    }

    fn report(&self, store: StoreKind, n: usize, total: u64) {
        self.progress.report(ProgressEvent {
            store,
            n: n as u64,
            total,
        });
    }
}

/// Items a unit handled before it finished, and how it finished.
type UnitOutcome = (usize, Result<()>);

/// Call a capability, racing it against cancellation and attributing
/// its failure to `store`.
async fn call<T>(
    store: StoreKind,
    cancel: &CancellationToken,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        r = fut => r.map_err(|e| SyncError::store(store, e)),
    }
}

/// Race `fut` against cancellation.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        r = fut => r,
    }
}

/// The capability for `store` if it was targeted; an error if it was
/// targeted but is absent.
fn required<T: ?Sized>(
    targets: &BTreeSet<StoreKind>,
    store: StoreKind,
    capability: &Option<Arc<T>>,
) -> Result<Option<Arc<T>>> {
    if !targets.contains(&store) {
        return Ok(None);
    }
    capability.clone().map(Some).ok_or_else(|| missing(store))
}

fn missing(store: StoreKind) -> SyncError {
    SyncError::invalid(format!("{} requested but no capability configured", store))
}

fn transfer_result(report: &TransferReport, cancelled: bool) -> SyncResult {
    let total = report.outcomes.len();
    if report.succeeded == total {
        return SyncResult::ok(StoreKind::ObjectStore, report.succeeded);
    }
    let error = if cancelled {
        format!(
            "operation cancelled after {} of {} thumbnail transfers",
            report.succeeded, total
        )
    } else {
        format!(
            "{} of {} thumbnail transfers failed",
            total - report.succeeded,
            total
        )
    };
    SyncResult {
        store: StoreKind::ObjectStore,
        status: SyncStatus::Failed,
        count: report.succeeded,
        error: Some(error),
        failed_keys: report.failed_keys(),
    }
}

/// Vector-index entry for a record: id is the canonical key, metadata
/// supports filtered similarity search.
fn index_vector(record: &Record, values: Vec<f32>) -> IndexVector {
    IndexVector {
        id: derive_key(record),
        values,
        metadata: serde_json::json!({
            "title": record.title,
            "author": record.author,
            "category": record.category.as_str(),
            "format": record.format.as_str(),
            "length": record.length.as_str(),
            "published_year": record.published_year,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(store: StoreKind, status: SyncStatus) -> SyncResult {
        SyncResult {
            store,
            status,
            count: 0,
            error: (status != SyncStatus::Ok).then(|| "boom".to_string()),
            failed_keys: Vec::new(),
        }
    }

    #[test]
    fn test_fold_full_partial_total() {
        use StoreKind::*;
        use SyncStatus::*;

        let full = [result(ObjectStore, Ok), result(DocumentStore, Ok)];
        assert_eq!(OverallStatus::from_results(&full), OverallStatus::FullSuccess);

        let partial = [result(ObjectStore, Ok), result(DocumentStore, Failed)];
        assert_eq!(
            OverallStatus::from_results(&partial),
            OverallStatus::PartialSuccess
        );

        let total = [result(ObjectStore, Failed), result(VectorIndex, Failed)];
        assert_eq!(OverallStatus::from_results(&total), OverallStatus::TotalFailure);
    }

    #[test]
    fn test_fold_ignores_unrequested_stores() {
        let results = [
            result(StoreKind::ObjectStore, SyncStatus::Ok),
            SyncResult::not_requested(StoreKind::DocumentStore),
            SyncResult::not_requested(StoreKind::VectorIndex),
        ];
        assert_eq!(
            OverallStatus::from_results(&results),
            OverallStatus::FullSuccess
        );
    }

    #[test]
    fn test_fold_counts_not_attempted_as_not_succeeded() {
        let results = [
            result(StoreKind::ObjectStore, SyncStatus::Ok),
            SyncResult::not_attempted(StoreKind::DocumentStore),
        ];
        assert_eq!(
            OverallStatus::from_results(&results),
            OverallStatus::PartialSuccess
        );
    }

    #[test]
    fn test_fold_empty_is_no_targets() {
        assert_eq!(OverallStatus::from_results(&[]), OverallStatus::NoTargets);
        let report = OperationReport::no_targets(Operation::Populate, Instant::now());
        assert_eq!(report.status, OverallStatus::NoTargets);
        assert_eq!(report.results.len(), 3);
        assert!(report
            .results
            .iter()
            .all(|r| r.status == SyncStatus::Skipped));
    }

    #[test]
    fn test_report_json_shape() {
        let report = OperationReport::new(
            Operation::Erase,
            vec![
                result(StoreKind::ObjectStore, SyncStatus::Ok),
                result(StoreKind::DocumentStore, SyncStatus::Failed),
                SyncResult::not_requested(StoreKind::VectorIndex),
            ],
            Instant::now(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "erase");
        assert_eq!(json["status"], "partial_success");
        assert_eq!(json["results"][0]["store"], "object-store");
        assert_eq!(json["results"][0]["status"], "ok");
        assert!(json["results"][0]["error"].is_null());
        assert!(json["results"][0].get("failed_keys").is_none());
        assert_eq!(json["results"][1]["status"], "failed");
        assert_eq!(json["results"][2]["status"], "skipped");
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let settings = SyncSettings {
            vector_batch_size: 0,
            ..SyncSettings::default()
        };
        assert!(matches!(
            StoreSyncOrchestrator::new(Capabilities::new(), settings),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_index_vector_metadata() {
        let r = crate::models::sample_record("9780061054884", "The Dispossessed");
        let v = index_vector(&r, vec![0.5; 4]);
        assert_eq!(v.id, "9780061054884");
        assert_eq!(v.metadata["category"], "Cyberpunk");
        assert_eq!(v.metadata["published_year"], 1974);
    }
}
