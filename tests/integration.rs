//! Orchestration tests driven through the public library API with
//! in-memory capabilities and fault-injecting wrappers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use catalog_sync::embedding::TextEncoder;
use catalog_sync::error::SyncError;
use catalog_sync::memory::{
    HashEncoder, InMemoryDocumentStore, InMemoryObjectStore, InMemoryVectorIndex, StaticFetch,
};
use catalog_sync::models::{Category, Format, Isbn13, LengthClass, Record, ThumbnailRef};
use catalog_sync::sync::{
    Capabilities, EraseScope, OverallStatus, StoreSyncOrchestrator, SyncSettings, SyncStatus,
};
use catalog_sync::traits::{DeleteCriteria, DocumentStore, StoreKind};

const DIMS: usize = 8;

fn record(n: u32) -> Record {
    let isbn = format!("978000000{:04}", n);
    Record {
        isbn: Isbn13::parse(&isbn).unwrap(),
        title: format!("Book {}", n),
        author: "Octavia E. Butler".to_string(),
        description: "A story about a possible future.".to_string(),
        category: Category::Thriller,
        format: Format::Ebook,
        length: LengthClass::LongRead,
        rating: Some(4.0),
        published_year: 1990 + n as i32,
        thumbnail: ThumbnailRef::Url(format!("https://covers.example.com/{}.jpg", isbn)),
    }
}

fn records(n: u32) -> Vec<Record> {
    (1..=n).map(record).collect()
}

fn fetch_for(records: &[Record]) -> StaticFetch {
    records.iter().fold(StaticFetch::new(), |f, r| {
        f.with(r.thumbnail.source_url().unwrap(), 200, b"\xFF\xD8jpeg")
    })
}

struct Stores {
    objects: Arc<InMemoryObjectStore>,
    documents: Arc<InMemoryDocumentStore>,
    vectors: Arc<InMemoryVectorIndex>,
}

fn stores() -> Stores {
    Stores {
        objects: Arc::new(InMemoryObjectStore::new()),
        documents: Arc::new(InMemoryDocumentStore::new()),
        vectors: Arc::new(InMemoryVectorIndex::new()),
    }
}

fn capabilities(s: &Stores, fetch: StaticFetch) -> Capabilities {
    Capabilities::new()
        .with_object_store(s.objects.clone(), Arc::new(fetch))
        .with_document_store(s.documents.clone())
        .with_vector_index(s.vectors.clone(), Arc::new(HashEncoder::new(DIMS)))
}

fn orchestrator(caps: Capabilities) -> StoreSyncOrchestrator {
    StoreSyncOrchestrator::new(caps, SyncSettings::default()).unwrap()
}

// ============ Fault injection ============

/// Document store whose writes always fail and whose calls are counted.
#[derive(Default)]
struct BrokenDocumentStore {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentStore for BrokenDocumentStore {
    async fn bulk_insert(&self, _records: &[Record]) -> anyhow::Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("connection reset by peer")
    }
    async fn bulk_delete(&self, _criteria: &DeleteCriteria) -> anyhow::Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("connection reset by peer")
    }
}

/// Document store that never answers within a test's lifetime.
struct StalledDocumentStore;

#[async_trait]
impl DocumentStore for StalledDocumentStore {
    async fn bulk_insert(&self, _records: &[Record]) -> anyhow::Result<usize> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(0)
    }
    async fn bulk_delete(&self, _criteria: &DeleteCriteria) -> anyhow::Result<usize> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(0)
    }
}

/// Wraps the in-memory store and counts bulk_insert calls.
struct CountingDocumentStore {
    inner: InMemoryDocumentStore,
    inserts: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingDocumentStore {
    async fn bulk_insert(&self, records: &[Record]) -> anyhow::Result<usize> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.bulk_insert(records).await
    }
    async fn bulk_delete(&self, criteria: &DeleteCriteria) -> anyhow::Result<usize> {
        self.inner.bulk_delete(criteria).await
    }
}

struct UnavailableEncoder;

#[async_trait]
impl TextEncoder for UnavailableEncoder {
    fn model_name(&self) -> &str {
        "unavailable"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn encode(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        bail!("model backend unavailable")
    }
}

// ============ Populate ============

#[tokio::test]
async fn test_populate_all_stores_full_success() {
    let recs = records(3);
    let s = stores();
    let orch = orchestrator(capabilities(&s, fetch_for(&recs)));

    let report = orch
        .populate(&recs, &StoreKind::ALL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::FullSuccess);
    for store in StoreKind::ALL {
        let r = report.result(store).unwrap();
        assert_eq!(r.status, SyncStatus::Ok, "{}", store);
        assert_eq!(r.count, 3, "{}", store);
        assert!(r.error.is_none());
    }

    assert_eq!(
        s.objects.keys(),
        vec![
            "thumbnails/9780000000001",
            "thumbnails/9780000000002",
            "thumbnails/9780000000003"
        ]
    );

    let doc = s.documents.get("9780000000002").unwrap();
    assert_eq!(
        doc.thumbnail,
        ThumbnailRef::Key("thumbnails/9780000000002".into())
    );
    assert_eq!(doc.title, "Book 2");

    let entry = s.vectors.get("9780000000003").unwrap();
    assert_eq!(entry.values.len(), DIMS);
    assert_eq!(entry.metadata["category"], "Thriller");
    assert_eq!(entry.metadata["published_year"], 1993);
}

#[tokio::test]
async fn test_one_missing_thumbnail_fails_only_object_store() {
    let recs = records(5);
    let fetch = recs
        .iter()
        .enumerate()
        .fold(StaticFetch::new(), |f, (i, r)| {
            let status = if i == 3 { 404 } else { 200 };
            f.with(r.thumbnail.source_url().unwrap(), status, b"jpeg")
        });
    let s = stores();
    let orch = orchestrator(capabilities(&s, fetch));

    let report = orch
        .populate(&recs, &StoreKind::ALL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    let objects = report.result(StoreKind::ObjectStore).unwrap();
    assert_eq!(objects.status, SyncStatus::Failed);
    assert_eq!(objects.count, 4);
    assert_eq!(objects.failed_keys, vec!["thumbnails/9780000000004"]);
    assert_eq!(s.objects.keys().len(), 4);

    assert!(report.result(StoreKind::DocumentStore).unwrap().is_ok());
    assert!(report.result(StoreKind::VectorIndex).unwrap().is_ok());
    assert_eq!(report.failed_stores(), vec![StoreKind::ObjectStore]);
}

#[tokio::test]
async fn test_document_store_failure_is_isolated() {
    let recs = records(4);
    let s = stores();
    let broken = Arc::new(BrokenDocumentStore::default());
    let caps = Capabilities::new()
        .with_object_store(s.objects.clone(), Arc::new(fetch_for(&recs)))
        .with_document_store(broken.clone());
    let orch = orchestrator(caps);

    let report = orch
        .populate(
            &recs,
            &[StoreKind::ObjectStore, StoreKind::DocumentStore],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(
        report.result(StoreKind::ObjectStore).unwrap().status,
        SyncStatus::Ok
    );
    let docs = report.result(StoreKind::DocumentStore).unwrap();
    assert_eq!(docs.status, SyncStatus::Failed);
    assert!(docs
        .error
        .as_deref()
        .unwrap()
        .contains("connection reset by peer"));
    assert_eq!(
        report.result(StoreKind::VectorIndex).unwrap().status,
        SyncStatus::Skipped
    );
    assert_eq!(s.objects.keys().len(), 4);
    assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_encoder_failure_fails_vector_index_only() {
    let recs = records(2);
    let s = stores();
    let caps = Capabilities::new()
        .with_document_store(s.documents.clone())
        .with_vector_index(s.vectors.clone(), Arc::new(UnavailableEncoder));
    let orch = orchestrator(caps);

    let report = orch
        .populate(
            &recs,
            &[StoreKind::DocumentStore, StoreKind::VectorIndex],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    let vectors = report.result(StoreKind::VectorIndex).unwrap();
    assert_eq!(vectors.status, SyncStatus::Failed);
    assert!(vectors.error.as_deref().unwrap().starts_with("encoding failed"));
    assert!(s.vectors.is_empty());
    assert_eq!(s.documents.len(), 2);
}

#[tokio::test]
async fn test_every_store_failing_is_total_failure() {
    let recs = records(2);
    let caps = Capabilities::new()
        .with_object_store(Arc::new(InMemoryObjectStore::new()), Arc::new(StaticFetch::new()))
        .with_document_store(Arc::new(BrokenDocumentStore::default()))
        .with_vector_index(
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(UnavailableEncoder),
        );
    let report = orchestrator(caps)
        .populate(&recs, &StoreKind::ALL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::TotalFailure);
    assert!(report.results.iter().all(|r| r.status == SyncStatus::Failed));
}

#[tokio::test]
async fn test_no_targets_touches_nothing() {
    let recs = records(3);
    let broken = Arc::new(BrokenDocumentStore::default());
    let caps = Capabilities::new().with_document_store(broken.clone());

    let report = orchestrator(caps)
        .populate(&recs, &[], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::NoTargets);
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.status == SyncStatus::Skipped));
    assert_eq!(broken.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_capability_is_invalid_argument() {
    let s = stores();
    let caps = Capabilities::new().with_document_store(s.documents.clone());

    let err = orchestrator(caps)
        .populate(&records(1), &[StoreKind::VectorIndex], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_duplicate_isbns_rejected_before_any_write() {
    let mut recs = records(3);
    recs.push(record(2));
    let s = stores();
    let orch = orchestrator(capabilities(&s, fetch_for(&recs)));

    let err = orch
        .populate(&recs, &StoreKind::ALL, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidArgument(_)));
    assert!(s.objects.keys().is_empty());
    assert!(s.documents.is_empty());
    assert!(s.vectors.is_empty());
}

#[tokio::test]
async fn test_document_writes_are_chunked() {
    let recs = records(5);
    let counting = Arc::new(CountingDocumentStore {
        inner: InMemoryDocumentStore::new(),
        inserts: AtomicUsize::new(0),
    });
    let settings = SyncSettings {
        document_batch_size: 2,
        ..SyncSettings::default()
    };
    let orch = StoreSyncOrchestrator::new(
        Capabilities::new().with_document_store(counting.clone()),
        settings,
    )
    .unwrap();

    let report = orch
        .populate(&recs, &[StoreKind::DocumentStore], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::FullSuccess);
    assert_eq!(report.result(StoreKind::DocumentStore).unwrap().count, 5);
    assert_eq!(counting.inserts.load(Ordering::SeqCst), 3);
    assert_eq!(counting.inner.len(), 5);
}

#[tokio::test]
async fn test_vector_upserts_match_standalone_embedding() {
    use catalog_sync::embedding::weighted::EmbeddingGenerator;
    use catalog_sync::weights::FieldWeightTable;

    let recs = records(7);
    let s = stores();
    let settings = SyncSettings {
        record_chunk_size: 3,
        vector_batch_size: 2,
        encoder_batch_size: 5,
        ..SyncSettings::default()
    };
    let caps = Capabilities::new()
        .with_vector_index(s.vectors.clone(), Arc::new(HashEncoder::new(DIMS)));
    let orch = StoreSyncOrchestrator::new(caps, settings).unwrap();

    orch.populate(&recs, &[StoreKind::VectorIndex], &CancellationToken::new())
        .await
        .unwrap();

    let generator = EmbeddingGenerator::new(
        Arc::new(HashEncoder::new(DIMS)),
        Arc::new(FieldWeightTable::default()),
        64,
    )
    .unwrap();
    let expected = generator.embed(&recs).await.unwrap();

    assert_eq!(s.vectors.len(), 7);
    for (r, want) in recs.iter().zip(expected) {
        let got = s.vectors.get(r.isbn.as_str()).unwrap().values;
        for (a, b) in got.iter().zip(want.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}

// ============ Cancellation ============

#[tokio::test]
async fn test_cancelled_before_start_reports_not_attempted() {
    let recs = records(2);
    let s = stores();
    let orch = orchestrator(capabilities(&s, fetch_for(&recs)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orch.populate(&recs, &StoreKind::ALL, &cancel).await.unwrap();

    assert_eq!(report.status, OverallStatus::TotalFailure);
    for r in &report.results {
        assert_eq!(r.status, SyncStatus::Skipped);
        assert!(r.error.as_deref().unwrap().contains("not attempted"));
    }
    assert!(s.objects.keys().is_empty());
    assert!(s.documents.is_empty());
}

#[tokio::test]
async fn test_cancellation_keeps_completed_outcomes() {
    let recs = records(3);
    let s = stores();
    let caps = Capabilities::new()
        .with_object_store(s.objects.clone(), Arc::new(fetch_for(&recs)))
        .with_document_store(Arc::new(StalledDocumentStore));
    let orch = orchestrator(caps);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        orch.populate(
            &recs,
            &[StoreKind::ObjectStore, StoreKind::DocumentStore],
            &cancel,
        ),
    )
    .await
    .expect("cancellation should end the stalled unit")
    .unwrap();

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert!(report.result(StoreKind::ObjectStore).unwrap().is_ok());
    let docs = report.result(StoreKind::DocumentStore).unwrap();
    assert_eq!(docs.status, SyncStatus::Failed);
    assert_eq!(docs.error.as_deref(), Some("operation cancelled"));
}

// ============ Erase ============

#[tokio::test]
async fn test_erase_by_keys_removes_only_listed_records() {
    let recs = records(4);
    let s = stores();
    let orch = orchestrator(capabilities(&s, fetch_for(&recs)));
    let cancel = CancellationToken::new();
    orch.populate(&recs, &StoreKind::ALL, &cancel).await.unwrap();

    let keys = vec![recs[0].isbn.clone(), recs[2].isbn.clone()];
    let report = orch
        .erase(&EraseScope::Keys(keys), &StoreKind::ALL, &cancel)
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::FullSuccess);
    assert_eq!(report.result(StoreKind::DocumentStore).unwrap().count, 2);
    assert_eq!(report.result(StoreKind::VectorIndex).unwrap().count, 2);
    assert_eq!(
        s.objects.keys(),
        vec!["thumbnails/9780000000002", "thumbnails/9780000000004"]
    );
    assert!(s.documents.get("9780000000001").is_none());
    assert!(s.documents.get("9780000000002").is_some());
    assert_eq!(s.vectors.len(), 2);
}

#[tokio::test]
async fn test_erase_all_empties_every_store() {
    let recs = records(3);
    let s = stores();
    let orch = orchestrator(capabilities(&s, fetch_for(&recs)));
    let cancel = CancellationToken::new();
    orch.populate(&recs, &StoreKind::ALL, &cancel).await.unwrap();

    let report = orch
        .erase(&EraseScope::All, &StoreKind::ALL, &cancel)
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::FullSuccess);
    assert!(s.objects.keys().is_empty());
    assert!(s.documents.is_empty());
    assert!(s.vectors.is_empty());
}

#[tokio::test]
async fn test_erase_with_empty_key_list_is_invalid() {
    let s = stores();
    let orch = orchestrator(capabilities(&s, StaticFetch::new()));
    let err = orch
        .erase(
            &EraseScope::Keys(Vec::new()),
            &StoreKind::ALL,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_erase_document_failure_is_isolated() {
    let recs = records(2);
    let s = stores();
    let caps = Capabilities::new()
        .with_object_store(s.objects.clone(), Arc::new(fetch_for(&recs)))
        .with_document_store(Arc::new(BrokenDocumentStore::default()));
    let orch = orchestrator(caps);
    let cancel = CancellationToken::new();
    orch.populate(&recs, &[StoreKind::ObjectStore], &cancel)
        .await
        .unwrap();

    let report = orch
        .erase(
            &EraseScope::All,
            &[StoreKind::ObjectStore, StoreKind::DocumentStore],
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(report.result(StoreKind::ObjectStore).unwrap().count, 2);
    assert!(s.objects.keys().is_empty());
}
