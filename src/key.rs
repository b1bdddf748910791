//! Stable external keys for records.
//!
//! The ISBN-13 is the single canonical identity across stores: it is the
//! vector-index entry id and, under the configured prefix, the object-store
//! key of the record's thumbnail. No composite (title/author/year) fallback
//! exists, so the same logical record can never be written under two keys.

use crate::models::Record;

/// Default object-store prefix under which thumbnails are kept.
pub const DEFAULT_THUMBNAIL_PREFIX: &str = "thumbnails/";

/// Derive the canonical key for a record. Pure and deterministic.
pub fn derive_key(record: &Record) -> String {
    record.isbn.as_str().to_string()
}

/// Object-store key for a record's thumbnail.
pub fn object_key(prefix: &str, record: &Record) -> String {
    object_key_for(prefix, record.isbn.as_str())
}

/// Object-store key for a bare identifier (used by erase-by-key).
pub fn object_key_for(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}
