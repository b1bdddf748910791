//! Capability traits for the external systems the core talks to.
//!
//! The synchronization core never constructs clients itself. Each
//! invocation receives explicitly constructed capability instances
//! (see [`Capabilities`](crate::sync::Capabilities)) whose lifetime is
//! scoped to that call.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            StoreSyncOrchestrator             │
//! │  ┌────────────┐ ┌────────────┐ ┌───────────┐ │
//! │  │ HttpFetch  │ │ Document   │ │ Text      │ │
//! │  │ + Object   │ │ Store      │ │ Encoder + │ │
//! │  │   Store    │ │            │ │ Vector    │ │
//! │  │            │ │            │ │ Index     │ │
//! │  └────────────┘ └────────────┘ └───────────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Built-in implementations:
//!
//! | Trait | Implementation |
//! |-------|----------------|
//! | [`ObjectStore`] | [`S3ObjectStore`](crate::connector_s3::S3ObjectStore) |
//! | [`HttpFetch`] | [`ReqwestFetch`](crate::fetch::ReqwestFetch) |
//! | [`DocumentStore`] | [`SqliteDocumentStore`](crate::sqlite_store::SqliteDocumentStore) |
//! | [`VectorIndex`] | [`PineconeIndex`](crate::pinecone::PineconeIndex) |
//!
//! In-memory versions of all four live in [`memory`](crate::memory).

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Isbn13, Record};

/// Identifies one of the three synchronized stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    ObjectStore,
    DocumentStore,
    VectorIndex,
}

impl StoreKind {
    pub const ALL: [StoreKind; 3] = [
        StoreKind::ObjectStore,
        StoreKind::DocumentStore,
        StoreKind::VectorIndex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::ObjectStore => "object-store",
            StoreKind::DocumentStore => "document-store",
            StoreKind::VectorIndex => "vector-index",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Object store
// ═══════════════════════════════════════════════════════════════════════

/// Binary blob store addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// Delete the given keys. Returns the number of delete requests issued.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Delete every object whose key starts with `prefix`.
    async fn delete_all(&self, prefix: &str) -> Result<usize>;
}

// ═══════════════════════════════════════════════════════════════════════
// HTTP fetch
// ═══════════════════════════════════════════════════════════════════════

/// A fetched HTTP response body with its status.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Downloads thumbnail bytes from their source URL.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Perform a GET. Non-2xx statuses are returned, not raised;
    /// only transport failures are errors.
    async fn get(&self, url: &str) -> Result<FetchResponse>;
}

// ═══════════════════════════════════════════════════════════════════════
// Document store
// ═══════════════════════════════════════════════════════════════════════

/// Selects which records a bulk delete removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteCriteria {
    All,
    Isbns(Vec<Isbn13>),
}

/// Structured record store, written in bulk.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a batch of records. Returns the number inserted.
    ///
    /// An identifier that already exists fails the batch.
    async fn bulk_insert(&self, records: &[Record]) -> Result<usize>;

    /// Delete records matching `criteria`. Returns the number removed.
    async fn bulk_delete(&self, criteria: &DeleteCriteria) -> Result<usize>;
}

// ═══════════════════════════════════════════════════════════════════════
// Vector index
// ═══════════════════════════════════════════════════════════════════════

/// One entry written to the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Nearest-neighbour index addressed by key.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a batch of vectors. Returns the upserted count.
    async fn upsert(&self, vectors: &[IndexVector]) -> Result<usize>;

    /// Delete vectors by id.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Delete every vector in the index (or configured namespace).
    async fn delete_all(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&StoreKind::VectorIndex).unwrap();
        assert_eq!(json, "\"vector-index\"");
        assert_eq!(StoreKind::DocumentStore.to_string(), "document-store");
    }
}
