//! In-memory capability implementations.
//!
//! Each type implements one of the capability traits in [`traits`](crate::traits)
//! (or [`TextEncoder`]) over `HashMap`s behind `std::sync::RwLock`. Used by
//! the test suites and by embedders who want to exercise the core without
//! any external service.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embedding::TextEncoder;
use crate::models::Record;
use crate::traits::{
    DeleteCriteria, DocumentStore, FetchResponse, HttpFetch, IndexVector, ObjectStore,
    VectorIndex,
};

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

// ============ Object store ============

/// Object store over a `BTreeMap<key, bytes>`.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().ok().and_then(|m| m.get(key).cloned())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: Option<&str>) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        for key in keys {
            objects.remove(key);
        }
        Ok(keys.len())
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let before = objects.len();
        objects.retain(|k, _| !k.starts_with(prefix));
        Ok(before - objects.len())
    }
}

// ============ HTTP fetch ============

/// Serves canned responses by URL; unknown URLs answer 404.
#[derive(Default)]
pub struct StaticFetch {
    responses: HashMap<String, (u16, Vec<u8>)>,
}

impl StaticFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.to_vec()));
        self
    }
}

#[async_trait]
impl HttpFetch for StaticFetch {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        let (status, body) = self
            .responses
            .get(url)
            .cloned()
            .unwrap_or((404, Vec::new()));
        Ok(FetchResponse {
            status,
            content_type: Some("image/jpeg".to_string()),
            body,
        })
    }
}

// ============ Document store ============

/// Document store keyed by ISBN.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    records: RwLock<BTreeMap<String, Record>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, isbn: &str) -> Option<Record> {
        self.records.read().ok().and_then(|m| m.get(isbn).cloned())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn bulk_insert(&self, records: &[Record]) -> Result<usize> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        if let Some(dup) = records.iter().find(|r| stored.contains_key(r.isbn.as_str())) {
            bail!("duplicate key: isbn_13 {} already exists", dup.isbn);
        }
        for record in records {
            stored.insert(record.isbn.as_str().to_string(), record.clone());
        }
        Ok(records.len())
    }

    async fn bulk_delete(&self, criteria: &DeleteCriteria) -> Result<usize> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        match criteria {
            DeleteCriteria::All => {
                let n = stored.len();
                stored.clear();
                Ok(n)
            }
            DeleteCriteria::Isbns(isbns) => Ok(isbns
                .iter()
                .filter(|isbn| stored.remove(isbn.as_str()).is_some())
                .count()),
        }
    }
}

// ============ Vector index ============

/// Vector index keyed by entry id.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<BTreeMap<String, IndexVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<IndexVector> {
        self.vectors.read().ok().and_then(|m| m.get(id).cloned())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, vectors: &[IndexVector]) -> Result<usize> {
        let mut stored = self.vectors.write().map_err(|_| poisoned())?;
        for v in vectors {
            stored.insert(v.id.clone(), v.clone());
        }
        Ok(vectors.len())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut stored = self.vectors.write().map_err(|_| poisoned())?;
        Ok(ids.iter().filter(|id| stored.remove(*id).is_some()).count())
    }

    async fn delete_all(&self) -> Result<()> {
        self.vectors.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

// ============ Encoder ============

/// Deterministic encoder: each text maps to a vector derived from its
/// SHA-256 digest, scaled into `[-1, 1]`.
pub struct HashEncoder {
    dims: usize,
}

impl HashEncoder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dims)
            .map(|i| (digest[i % digest.len()] as f32 / 127.5) - 1.0)
            .collect()
    }
}

#[async_trait]
impl TextEncoder for HashEncoder {
    fn model_name(&self) -> &str {
        "sha256-hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_record;

    #[tokio::test]
    async fn test_document_store_rejects_duplicates() {
        let store = InMemoryDocumentStore::new();
        let r = sample_record("9780000000001", "Neuromancer");
        assert_eq!(store.bulk_insert(&[r.clone()]).await.unwrap(), 1);
        assert!(store.bulk_insert(&[r]).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_object_store_prefix_delete() {
        let store = InMemoryObjectStore::new();
        store.put("thumbnails/a", vec![1], None).await.unwrap();
        store.put("thumbnails/b", vec![2], None).await.unwrap();
        store.put("other/c", vec![3], None).await.unwrap();
        assert_eq!(store.delete_all("thumbnails/").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["other/c".to_string()]);
    }

    #[tokio::test]
    async fn test_hash_encoder_is_deterministic() {
        let enc = HashEncoder::new(16);
        let a = enc.encode(&["x".into(), "y".into(), "x".into()]).await.unwrap();
        assert_eq!(a[0], a[2]);
        assert_ne!(a[0], a[1]);
        assert!(a[0].iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
