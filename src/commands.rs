//! Command implementations for the `catalog` binary.
//!
//! Each command builds the capabilities it needs from [`Config`], runs the
//! core, and prints its result on stdout. Capabilities are built per
//! invocation and released before the command returns.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connector_s3::S3ObjectStore;
use crate::db;
use crate::embedding::weighted::EmbeddingGenerator;
use crate::embedding::{create_encoder, TextEncoder};
use crate::fetch::ReqwestFetch;
use crate::key::{derive_key, object_key};
use crate::migrate;
use crate::models::{load_records, Isbn13};
use crate::pinecone::PineconeIndex;
use crate::progress::ProgressMode;
use crate::sqlite_store::SqliteDocumentStore;
use crate::sync::{
    Capabilities, EraseScope, OperationReport, OverallStatus, StoreSyncOrchestrator,
    SyncSettings, SyncStatus,
};
use crate::traits::{StoreKind, VectorIndex};

/// Create the document-store schema.
pub async fn run_init(config: &Config) -> Result<()> {
    let ds = config
        .document_store
        .as_ref()
        .context("No [document_store] section in config")?;
    let pool = db::connect(ds).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Document store initialized at {}.", ds.path.display());
    Ok(())
}

/// Populate the requested stores from a JSON records file.
pub async fn run_populate(
    config: &Config,
    records_path: &Path,
    targets: &[StoreKind],
    json: bool,
    progress: ProgressMode,
    cancel: &CancellationToken,
) -> Result<OverallStatus> {
    let records = load_records(records_path)?;
    tracing::info!(records = records.len(), path = %records_path.display(), "loaded records");

    let (caps, sqlite) = build_capabilities(config, targets, true).await?;
    let orchestrator = StoreSyncOrchestrator::new(caps, SyncSettings::from_config(config))?
        .with_weights(Arc::new(config.embedding.weight_table()?))
        .with_progress(progress.reporter());

    let report = orchestrator.populate(&records, targets, cancel).await;
    drop(orchestrator);
    release(sqlite).await;

    let report = report?;
    print_report(&report, json)?;
    Ok(report.status)
}

/// Erase the listed ISBNs (or everything when none are listed).
pub async fn run_erase(
    config: &Config,
    isbns: &[String],
    targets: &[StoreKind],
    json: bool,
    cancel: &CancellationToken,
) -> Result<OverallStatus> {
    let scope = if isbns.is_empty() {
        EraseScope::All
    } else {
        let keys = isbns
            .iter()
            .map(|s| Isbn13::parse(s).map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;
        EraseScope::Keys(keys)
    };

    let (caps, sqlite) = build_capabilities(config, targets, false).await?;
    let orchestrator = StoreSyncOrchestrator::new(caps, SyncSettings::from_config(config))?;

    let report = orchestrator.erase(&scope, targets, cancel).await;
    drop(orchestrator);
    release(sqlite).await;

    let report = report?;
    print_report(&report, json)?;
    Ok(report.status)
}

/// Print each record's embedding as `[{"isbn_13", "vector"}]` JSON.
pub async fn run_embed(config: &Config, records_path: &Path) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let records = load_records(records_path)?;
    let encoder = create_encoder(&config.embedding)?;
    tracing::info!(model = encoder.model_name(), dims = encoder.dims(), "embedding records");

    let generator = EmbeddingGenerator::new(
        encoder,
        Arc::new(config.embedding.weight_table()?),
        config.embedding.batch_size,
    )?;
    let vectors = generator.embed(&records).await?;

    let out: Vec<serde_json::Value> = records
        .iter()
        .zip(vectors)
        .map(|(r, v)| serde_json::json!({ "isbn_13": r.isbn, "vector": v }))
        .collect();
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

/// Print each record's canonical key and thumbnail object key.
pub fn run_key(config: &Config, records_path: &Path) -> Result<()> {
    let records = load_records(records_path)?;
    for record in &records {
        println!(
            "{}\t{}",
            derive_key(record),
            object_key(&config.sync.thumbnail_prefix, record)
        );
    }
    Ok(())
}

async fn release(sqlite: Option<Arc<SqliteDocumentStore>>) {
    if let Some(store) = sqlite {
        store.close().await;
    }
}

/// Capabilities for the requested targets, plus the SQLite handle so the
/// caller can close its pool.
async fn build_capabilities(
    config: &Config,
    targets: &[StoreKind],
    populate: bool,
) -> Result<(Capabilities, Option<Arc<SqliteDocumentStore>>)> {
    let mut caps = Capabilities::new();
    let mut sqlite = None;

    if targets.contains(&StoreKind::ObjectStore) {
        let os = config
            .object_store
            .clone()
            .context("--object-store requires an [object_store] section in config")?;
        let store = Arc::new(S3ObjectStore::new(os)?);
        let fetch = Arc::new(ReqwestFetch::new(config.sync.fetch_timeout_secs)?);
        caps = caps.with_object_store(store, fetch);
    }

    if targets.contains(&StoreKind::DocumentStore) {
        let ds = config
            .document_store
            .as_ref()
            .context("--document-store requires a [document_store] section in config")?;
        let store = Arc::new(SqliteDocumentStore::open(ds).await?);
        sqlite = Some(Arc::clone(&store));
        caps = caps.with_document_store(store);
    }

    if targets.contains(&StoreKind::VectorIndex) {
        let vi = config
            .vector_index
            .as_ref()
            .context("--vector-index requires a [vector_index] section in config")?;
        let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(vi)?);
        if populate {
            if !config.embedding.is_enabled() {
                bail!("--vector-index requires an [embedding] provider to populate");
            }
            let encoder: Arc<dyn TextEncoder> = create_encoder(&config.embedding)?;
            caps = caps.with_vector_index(index, encoder);
        } else {
            caps.vector_index = Some(index);
        }
    }

    Ok((caps, sqlite))
}

fn print_report(report: &OperationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {} ({} ms)",
        report.operation.as_str(),
        report.status.as_str(),
        report.elapsed_ms
    );
    for r in &report.results {
        let status = match r.status {
            SyncStatus::Ok => "ok",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
        };
        match &r.error {
            Some(e) => println!("  {:<15} {:<8} {:>6}  {}", r.store.as_str(), status, r.count, e),
            None => println!("  {:<15} {:<8} {:>6}", r.store.as_str(), status, r.count),
        }
        if !r.failed_keys.is_empty() {
            println!("    failed keys: {}", r.failed_keys.join(", "));
        }
    }
    if report.status == OverallStatus::PartialSuccess {
        let failed: Vec<&str> = report.failed_stores().iter().map(|s| s.as_str()).collect();
        println!("Re-run with only: {}", failed.join(", "));
    }
    Ok(())
}
