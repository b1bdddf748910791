//! Publication-year bucketing.
//!
//! The bucket is a synthetic categorical field embedded alongside the
//! record's literal text fields.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBucket {
    Old,
    Recent,
    New,
}

impl AgeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBucket::Old => "old",
            AgeBucket::Recent => "recent",
            AgeBucket::New => "new",
        }
    }
}

/// Inclusive year ranges, open-ended at both extremes.
const BOUNDARIES: [(AgeBucket, i32, i32); 3] = [
    (AgeBucket::Old, i32::MIN, 1999),
    (AgeBucket::Recent, 2000, 2020),
    (AgeBucket::New, 2021, i32::MAX),
];

/// Map a publication year to its bucket. Falls back to `Recent`.
pub fn bucket(year: i32) -> AgeBucket {
    BOUNDARIES
        .iter()
        .find(|(_, lo, hi)| (*lo..=*hi).contains(&year))
        .map(|(b, _, _)| *b)
        .unwrap_or(AgeBucket::Recent)
}
