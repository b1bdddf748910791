//! Error kinds raised by the synchronization core.
//!
//! Capability implementations (S3, SQLite, Pinecone, encoders) report
//! failures as [`anyhow::Error`]; the core converts them into a
//! [`SyncError`] at the boundary of the unit of work that owns the call,
//! so every failure in an [`OperationReport`](crate::sync::OperationReport)
//! is attributable to one kind and one store.

use thiserror::Error;

use crate::traits::StoreKind;

/// Errors produced by the synchronization core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// Caller misuse or misconfiguration: zero chunk size, empty weight
    /// table, empty key list, missing capability for a requested target.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The text encoder failed. Fails the whole embedding call.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// A single thumbnail could not be fetched or uploaded.
    #[error("transfer of '{key}' failed: {reason}")]
    Transfer { key: String, reason: String },

    /// A bulk operation against a document store or vector index failed.
    #[error("{store} operation failed: {reason}")]
    Store { store: StoreKind, reason: String },

    /// The caller's cancellation signal fired before the work completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SyncError::InvalidArgument(msg.into())
    }

    pub(crate) fn encoding(err: anyhow::Error) -> Self {
        SyncError::Encoding(format!("{:#}", err))
    }

    pub(crate) fn store(store: StoreKind, err: anyhow::Error) -> Self {
        SyncError::Store {
            store,
            reason: format!("{:#}", err),
        }
    }

    pub(crate) fn transfer(key: &str, reason: impl Into<String>) -> Self {
        SyncError::Transfer {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
