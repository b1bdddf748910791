//! Thumbnail transfer: source URL → object store.
//!
//! Every record is handled by its own task. A semaphore bounds how many
//! transfers are in flight, and each task reports exactly one outcome, so a
//! failed download or upload never aborts or delays the others. There is
//! one attempt per record; retrying is the caller's job (re-run
//! [`ThumbnailTransferPipeline::transfer`] on the failed subset).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::key::{object_key, DEFAULT_THUMBNAIL_PREFIX};
use crate::models::{Isbn13, Record};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::traits::{HttpFetch, ObjectStore, StoreKind};

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Result of transferring one record's thumbnail.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub isbn: Isbn13,
    pub key: String,
    pub error: Option<SyncError>,
}

impl TransferOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-record outcomes in input order, plus the success tally.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub outcomes: Vec<TransferOutcome>,
    pub succeeded: usize,
}

impl TransferReport {
    pub fn failed(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.failed().map(|o| o.key.clone()).collect()
    }
}

pub struct ThumbnailTransferPipeline {
    fetch: Arc<dyn HttpFetch>,
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
    prefix: String,
    progress: Arc<dyn ProgressReporter>,
}

impl ThumbnailTransferPipeline {
    /// Fails with `InvalidArgument` when `concurrency` is zero.
    pub fn new(
        fetch: Arc<dyn HttpFetch>,
        store: Arc<dyn ObjectStore>,
        concurrency: usize,
    ) -> Result<Self> {
        if concurrency == 0 {
            return Err(SyncError::invalid("transfer concurrency must be >= 1"));
        }
        Ok(Self {
            fetch,
            store,
            concurrency,
            prefix: DEFAULT_THUMBNAIL_PREFIX.to_string(),
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Transfer every record's thumbnail and report each outcome.
    ///
    /// On cancellation, transfers that have not finished are abandoned and
    /// reported as [`SyncError::Cancelled`].
    pub async fn transfer(&self, records: &[Record], cancel: &CancellationToken) -> TransferReport {
        let total = records.len() as u64;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicU64::new(0));

        let mut outcomes: Vec<TransferOutcome> = Vec::with_capacity(records.len());
        let mut tasks = JoinSet::new();

        for (idx, record) in records.iter().enumerate() {
            let key = object_key(&self.prefix, record);
            outcomes.push(TransferOutcome {
                isbn: record.isbn.clone(),
                key: key.clone(),
                error: Some(SyncError::transfer(&key, "transfer task aborted")),
            });

            let source = record.thumbnail.source_url().map(str::to_string);
            let fetch = Arc::clone(&self.fetch);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let succeeded = Arc::clone(&succeeded);
            let done = Arc::clone(&done);
            let progress = Arc::clone(&self.progress);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SyncError::Cancelled),
                    r = async {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| SyncError::Cancelled)?;
                        transfer_one(fetch.as_ref(), store.as_ref(), &key, source.as_deref()).await
                    } => r,
                };

                match &result {
                    Ok(()) => {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => tracing::warn!(key = %key, "{}", e),
                }
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(ProgressEvent {
                    store: StoreKind::ObjectStore,
                    n,
                    total,
                });

                (idx, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => outcomes[idx].error = result.err(),
                Err(e) => tracing::warn!("thumbnail transfer task failed: {}", e),
            }
        }

        let succeeded = succeeded.load(Ordering::SeqCst);
        tracing::info!(succeeded, total, "thumbnail transfer finished");

        TransferReport {
            outcomes,
            succeeded,
        }
    }
}

async fn transfer_one(
    fetch: &dyn HttpFetch,
    store: &dyn ObjectStore,
    key: &str,
    source: Option<&str>,
) -> Result<()> {
    let url = source.ok_or_else(|| SyncError::transfer(key, "thumbnail has no source URL"))?;

    let response = fetch
        .get(url)
        .await
        .map_err(|e| SyncError::transfer(key, format!("fetch {}: {:#}", url, e)))?;

    if response.status != 200 {
        return Err(SyncError::transfer(
            key,
            format!("fetch {} returned HTTP {}", url, response.status),
        ));
    }

    store
        .put(key, response.body, response.content_type.as_deref())
        .await
        .map_err(|e| SyncError::transfer(key, format!("upload: {:#}", e)))?;

    tracing::debug!(key, "thumbnail stored");
    Ok(())
}
