//! Per-field embedding weights.
//!
//! A [`FieldWeightTable`] is built once, normalized so its weights sum to 1,
//! and then shared read-only (behind an `Arc`) by every embedding call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::age;
use crate::error::{Result, SyncError};
use crate::models::Record;

/// A record field that contributes to the embedding.
///
/// Declaration order is the canonical field order used when flattening
/// records for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Author,
    Description,
    Category,
    Format,
    Length,
    AgeBucket,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Title,
        Field::Author,
        Field::Description,
        Field::Category,
        Field::Format,
        Field::Length,
        Field::AgeBucket,
    ];

    /// Resolve the text this field contributes for a record.
    pub fn text<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            Field::Title => &record.title,
            Field::Author => &record.author,
            Field::Description => &record.description,
            Field::Category => record.category.as_str(),
            Field::Format => record.format.as_str(),
            Field::Length => record.length.as_str(),
            Field::AgeBucket => age::bucket(record.published_year).as_str(),
        }
    }
}

/// Normalized field → weight mapping in canonical field order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWeightTable {
    entries: Vec<(Field, f32)>,
}

impl FieldWeightTable {
    /// Build a table from raw weights, normalizing them to sum to 1.
    ///
    /// Fails with `InvalidArgument` if the table is empty, a field repeats,
    /// or any weight is not a finite positive number.
    pub fn new(raw: &[(Field, f32)]) -> Result<Self> {
        if raw.is_empty() {
            return Err(SyncError::invalid("field weight table is empty"));
        }

        let mut by_field = BTreeMap::new();
        for &(field, weight) in raw {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(SyncError::invalid(format!(
                    "weight for {:?} must be > 0, got {}",
                    field, weight
                )));
            }
            if by_field.insert(field, weight).is_some() {
                return Err(SyncError::invalid(format!(
                    "field {:?} appears more than once",
                    field
                )));
            }
        }

        let total: f32 = by_field.values().sum();
        let entries = by_field
            .into_iter()
            .map(|(field, weight)| (field, weight / total))
            .collect();

        Ok(Self { entries })
    }

    /// Build a table from a config override map.
    pub fn from_map(map: &BTreeMap<Field, f32>) -> Result<Self> {
        let raw: Vec<(Field, f32)> = map.iter().map(|(f, w)| (*f, *w)).collect();
        Self::new(&raw)
    }

    pub fn entries(&self) -> &[(Field, f32)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weight(&self, field: Field) -> Option<f32> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, w)| *w)
    }
}

impl Default for FieldWeightTable {
    /// title 2, author 2, description 4, category 1, format 0.5,
    /// length 0.5 and age bucket 0.5, normalized to sum to 1.
    fn default() -> Self {
        let entries = [
            (Field::Title, 2.0),
            (Field::Author, 2.0),
            (Field::Description, 4.0),
            (Field::Category, 1.0),
            (Field::Format, 0.5),
            (Field::Length, 0.5),
            (Field::AgeBucket, 0.5),
        ];
        let total: f32 = entries.iter().map(|(_, w)| w).sum();
        Self {
            entries: entries.iter().map(|(f, w)| (*f, w / total)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_record;

    fn sum(table: &FieldWeightTable) -> f32 {
        table.entries().iter().map(|(_, w)| w).sum()
    }

    #[test]
    fn test_default_sums_to_one() {
        let t = FieldWeightTable::default();
        assert_eq!(t.len(), 7);
        assert!((sum(&t) - 1.0).abs() < 1e-6);
        assert!((t.weight(Field::Description).unwrap() - 4.0 / 10.5).abs() < 1e-6);
    }

    #[test]
    fn test_default_matches_explicit_construction() {
        let explicit = FieldWeightTable::new(&[
            (Field::AgeBucket, 0.5),
            (Field::Title, 2.0),
            (Field::Author, 2.0),
            (Field::Description, 4.0),
            (Field::Category, 1.0),
            (Field::Format, 0.5),
            (Field::Length, 0.5),
        ])
        .unwrap();
        assert_eq!(explicit, FieldWeightTable::default());
    }

    #[test]
    fn test_arbitrary_tables_normalize() {
        let tables: Vec<Vec<(Field, f32)>> = vec![
            vec![(Field::Title, 1.0)],
            vec![(Field::Title, 1e-3), (Field::Author, 1e3)],
            vec![(Field::Description, 7.0), (Field::Length, 3.0), (Field::Format, 0.25)],
        ];
        for raw in tables {
            let t = FieldWeightTable::new(&raw).unwrap();
            assert!((sum(&t) - 1.0).abs() < 1e-5, "{:?}", raw);
        }
    }

    #[test]
    fn test_entries_follow_canonical_order() {
        let t = FieldWeightTable::new(&[(Field::Length, 1.0), (Field::Title, 1.0)]).unwrap();
        let fields: Vec<Field> = t.entries().iter().map(|(f, _)| *f).collect();
        assert_eq!(fields, vec![Field::Title, Field::Length]);
    }

    #[test]
    fn test_rejects_empty_and_non_positive() {
        assert!(matches!(
            FieldWeightTable::new(&[]),
            Err(SyncError::InvalidArgument(_))
        ));
        assert!(FieldWeightTable::new(&[(Field::Title, 0.0)]).is_err());
        assert!(FieldWeightTable::new(&[(Field::Title, -1.0)]).is_err());
        assert!(FieldWeightTable::new(&[(Field::Title, f32::NAN)]).is_err());
        assert!(FieldWeightTable::new(&[(Field::Title, 1.0), (Field::Title, 2.0)]).is_err());
    }

    #[test]
    fn test_field_text_resolution() {
        let r = sample_record("9780061054884", "The Dispossessed");
        assert_eq!(Field::Title.text(&r), "The Dispossessed");
        assert_eq!(Field::Category.text(&r), "Cyberpunk");
        assert_eq!(Field::Length.text(&r), "Standard Length");
        assert_eq!(Field::AgeBucket.text(&r), "old");
    }
}
