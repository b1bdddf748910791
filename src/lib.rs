//! # Catalog Sync
//!
//! Keeps book records consistent across three independent stores: an
//! object store holding cover thumbnails, a document store holding the
//! structured metadata, and a vector index holding weighted multi-field
//! embeddings for similarity search.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────────────────┐
//!   records ────▶ │ StoreSyncOrchestrator │
//!                 └──┬─────────┬────────┬─┘
//!                    │         │        │       (concurrent, isolated)
//!                    ▼         ▼        ▼
//!          ┌───────────┐ ┌────────┐ ┌─────────────────────┐
//!          │ Thumbnail │ │  bulk  │ │ EmbeddingGenerator  │
//!          │ Transfer  │ │ insert │ │  + chunked upsert   │
//!          └─────┬─────┘ └───┬────┘ └──────────┬──────────┘
//!                ▼           ▼                 ▼
//!            S3 bucket     SQLite           Pinecone
//! ```
//!
//! Every populate or erase returns an [`OperationReport`](sync::OperationReport)
//! with one result per store. Partial success is an expected outcome; the
//! caller re-runs only the stores that failed.
//!
//! ## Quick Start
//!
//! ```bash
//! catalog init                                  # create document-store schema
//! catalog populate data/books.json --all        # write to all three stores
//! catalog erase --isbn 9780061054884 --all      # remove one book everywhere
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Record types and JSON loading |
//! | [`key`] | Canonical record keys |
//! | [`weights`] | Per-field embedding weights |
//! | [`age`] | Publication-year buckets |
//! | [`chunk`] | Fixed-size batching |
//! | [`embedding`] | Text encoders and the weighted embedding generator |
//! | [`thumbnails`] | Thumbnail transfer pipeline |
//! | [`sync`] | Multi-store orchestrator and reports |
//! | [`traits`] | Capability traits for external systems |
//! | [`connector_s3`] | S3 object store |
//! | [`fetch`] | HTTP thumbnail download |
//! | [`sqlite_store`] | SQLite document store |
//! | [`pinecone`] | Pinecone vector index |
//! | [`memory`] | In-memory capabilities |
//! | [`config`] | TOML configuration |

pub mod age;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod connector_s3;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod key;
pub mod logging;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod pinecone;
pub mod progress;
pub mod sqlite_store;
pub mod sync;
pub mod thumbnails;
pub mod traits;
pub mod weights;
