//! Core data models for catalog records.
//!
//! A [`Record`] arrives already validated by the caller; the only check the
//! core itself relies on is the identifier format, which is enforced by the
//! [`Isbn13`] newtype at deserialization time.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A 13-digit ISBN identifier. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn13(String);

impl Isbn13 {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let trimmed = s.trim();
        if trimmed.len() != 13 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{}' is not a 13-digit ISBN", s));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Isbn13 {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Isbn13::parse(&value)
    }
}

impl From<Isbn13> for String {
    fn from(value: Isbn13) -> Self {
        value.0
    }
}

impl fmt::Display for Isbn13 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Cyberpunk,
    Romance,
    Thriller,
    Comics,
    Mystery,
    #[serde(rename = "Action Adventure")]
    ActionAdventure,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cyberpunk => "Cyberpunk",
            Category::Romance => "Romance",
            Category::Thriller => "Thriller",
            Category::Comics => "Comics",
            Category::Mystery => "Mystery",
            Category::ActionAdventure => "Action Adventure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Ebook,
    Audiobook,
    Paperback,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Ebook => "Ebook",
            Format::Audiobook => "Audiobook",
            Format::Paperback => "Paperback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthClass {
    #[serde(rename = "Short Read")]
    ShortRead,
    #[serde(rename = "Standard Length")]
    StandardLength,
    #[serde(rename = "Long Read")]
    LongRead,
}

impl LengthClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthClass::ShortRead => "Short Read",
            LengthClass::StandardLength => "Standard Length",
            LengthClass::LongRead => "Long Read",
        }
    }
}

/// Where a record's cover thumbnail currently lives.
///
/// Records enter the core pointing at a source URL; once the thumbnail has
/// been copied into the object store the reference becomes the object key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThumbnailRef {
    Url(String),
    Key(String),
}

impl ThumbnailRef {
    pub fn source_url(&self) -> Option<&str> {
        match self {
            ThumbnailRef::Url(url) => Some(url),
            ThumbnailRef::Key(_) => None,
        }
    }
}

impl From<String> for ThumbnailRef {
    fn from(value: String) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            ThumbnailRef::Url(value)
        } else {
            ThumbnailRef::Key(value)
        }
    }
}

impl From<ThumbnailRef> for String {
    fn from(value: ThumbnailRef) -> Self {
        match value {
            ThumbnailRef::Url(s) | ThumbnailRef::Key(s) => s,
        }
    }
}

/// One catalog item's structured metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "isbn_13", alias = "isbn")]
    pub isbn: Isbn13,
    pub title: String,
    pub author: String,
    pub description: String,
    pub category: Category,
    pub format: Format,
    pub length: LengthClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    pub published_year: i32,
    pub thumbnail: ThumbnailRef,
}

/// Fixed-dimension embedding produced for one record.
pub type EmbeddingVector = Vec<f32>;

/// Load a JSON array of records from disk.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file: {}", path.display()))?;
    let records: Vec<Record> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records file: {}", path.display()))?;
    Ok(records)
}

#[cfg(test)]
pub(crate) fn sample_record(isbn: &str, title: &str) -> Record {
    Record {
        isbn: Isbn13::parse(isbn).unwrap(),
        title: title.to_string(),
        author: "Ursula K. Le Guin".to_string(),
        description: "An anarchist physicist crosses between two worlds.".to_string(),
        category: Category::Cyberpunk,
        format: Format::Paperback,
        length: LengthClass::StandardLength,
        rating: Some(4.5),
        published_year: 1974,
        thumbnail: ThumbnailRef::Url(format!("https://covers.example.com/{}.jpg", isbn)),
    }
}
