//! Weighted multi-field record embeddings.
//!
//! Each record is flattened into one `(text, weight)` pair per field in the
//! weight table, record-major and field-minor, so record `i` owns the
//! contiguous run `[i * F, (i + 1) * F)` of the flattened list (`F` = number
//! of weighted fields). The flattened texts are encoded in sub-batches of
//! `encoder_batch_size`, and every record's vector is the weighted sum of
//! its run:
//!
//! ```text
//! v(record) = Σ_f  w_f × encode(text_f(record))
//! ```
//!
//! Weights are the normalized table weights; no normalization is applied
//! after summation.

use std::sync::Arc;

use crate::chunk::chunk;
use crate::embedding::TextEncoder;
use crate::error::{Result, SyncError};
use crate::models::{EmbeddingVector, Record};
use crate::weights::FieldWeightTable;

/// Turns records into single fixed-dimension vectors.
pub struct EmbeddingGenerator {
    encoder: Arc<dyn TextEncoder>,
    weights: Arc<FieldWeightTable>,
    encoder_batch_size: usize,
}

impl EmbeddingGenerator {
    /// Fails with `InvalidArgument` when `encoder_batch_size` is zero or the
    /// weight table is empty.
    pub fn new(
        encoder: Arc<dyn TextEncoder>,
        weights: Arc<FieldWeightTable>,
        encoder_batch_size: usize,
    ) -> Result<Self> {
        if encoder_batch_size == 0 {
            return Err(SyncError::invalid("encoder batch size must be >= 1"));
        }
        if weights.is_empty() {
            return Err(SyncError::invalid("field weight table is empty"));
        }
        Ok(Self {
            encoder,
            weights,
            encoder_batch_size,
        })
    }

    pub fn dims(&self) -> usize {
        self.encoder.dims()
    }

    /// Embed records, returning one vector per record in input order.
    ///
    /// Any encoder failure fails the whole call.
    pub async fn embed(&self, records: &[Record]) -> Result<Vec<EmbeddingVector>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let fields = self.weights.entries();
        let per_record = fields.len();
        let dims = self.encoder.dims();

        let mut texts = Vec::with_capacity(records.len() * per_record);
        for record in records {
            for (field, _) in fields {
                texts.push(field.text(record).to_string());
            }
        }

        let mut out = vec![vec![0.0f32; dims]; records.len()];
        let mut offset = 0usize;

        for batch in chunk(&texts, self.encoder_batch_size)? {
            tracing::debug!(
                offset,
                batch = batch.len(),
                total = texts.len(),
                "encoding field texts"
            );
            let encoded = self
                .encoder
                .encode(batch)
                .await
                .map_err(SyncError::encoding)?;

            if encoded.len() != batch.len() {
                return Err(SyncError::Encoding(format!(
                    "encoder returned {} vectors for {} texts",
                    encoded.len(),
                    batch.len()
                )));
            }

            for (i, vector) in encoded.iter().enumerate() {
                if vector.len() != dims {
                    return Err(SyncError::Encoding(format!(
                        "encoder returned a {}-dimensional vector, expected {}",
                        vector.len(),
                        dims
                    )));
                }
                let flat = offset + i;
                let weight = fields[flat % per_record].1;
                let target = &mut out[flat / per_record];
                for (acc, v) in target.iter_mut().zip(vector) {
                    *acc += weight * v;
                }
            }
            offset += batch.len();
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HashEncoder;
    use crate::models::sample_record;
    use crate::weights::Field;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn generator(batch: usize) -> EmbeddingGenerator {
        EmbeddingGenerator::new(
            Arc::new(HashEncoder::new(8)),
            Arc::new(FieldWeightTable::default()),
            batch,
        )
        .unwrap()
    }

    /// Encodes every text as the same unit vector and records call shapes.
    struct CountingEncoder {
        calls: AtomicUsize,
        max_batch: AtomicUsize,
    }

    #[async_trait]
    impl TextEncoder for CountingEncoder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.max_batch.fetch_max(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    struct FailingEncoder;

    #[async_trait]
    impl TextEncoder for FailingEncoder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn encode(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            bail!("backend unavailable")
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let out = generator(4).embed(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_single_record_has_native_dims() {
        let out = generator(4)
            .embed(&[sample_record("9780000000001", "Neuromancer")])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 8);
    }

    #[tokio::test]
    async fn test_duplicate_records_embed_identically() {
        let r = sample_record("9780000000001", "Neuromancer");
        let out = generator(3).embed(&[r.clone(), r]).await.unwrap();
        assert_eq!(out[0], out[1]);
    }

    #[tokio::test]
    async fn test_result_independent_of_encoder_batch_size() {
        let records = vec![
            sample_record("9780000000001", "Neuromancer"),
            sample_record("9780000000002", "Snow Crash"),
            sample_record("9780000000003", "Altered Carbon"),
        ];
        let reference = generator(1000).embed(&records).await.unwrap();
        for batch in [1, 2, 5, 7, 13] {
            let out = generator(batch).embed(&records).await.unwrap();
            for (a, b) in reference.iter().zip(out.iter()) {
                for (x, y) in a.iter().zip(b.iter()) {
                    assert!((x - y).abs() < 1e-6, "batch {}", batch);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_no_cross_record_leakage() {
        let a = sample_record("9780000000001", "Neuromancer");
        let b = sample_record("9780000000002", "Snow Crash");
        let alone = generator(5).embed(&[a.clone()]).await.unwrap();
        let paired = generator(5).embed(&[b, a]).await.unwrap();
        assert_eq!(alone[0], paired[1]);
    }

    #[tokio::test]
    async fn test_weighted_sum_of_constant_vectors_sums_to_one() {
        let encoder = Arc::new(CountingEncoder {
            calls: AtomicUsize::new(0),
            max_batch: AtomicUsize::new(0),
        });
        let gen = EmbeddingGenerator::new(
            encoder.clone(),
            Arc::new(FieldWeightTable::default()),
            3,
        )
        .unwrap();
        let records = vec![
            sample_record("9780000000001", "Neuromancer"),
            sample_record("9780000000002", "Snow Crash"),
        ];
        let out = gen.embed(&records).await.unwrap();
        for v in &out {
            assert!((v[0] - 1.0).abs() < 1e-6);
            assert_eq!(v[1], 0.0);
        }
        // 2 records x 7 fields = 14 texts in batches of 3
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 5);
        assert_eq!(encoder.max_batch.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_only_weighted_fields_contribute() {
        let weights = FieldWeightTable::new(&[(Field::Title, 1.0)]).unwrap();
        let gen = EmbeddingGenerator::new(Arc::new(HashEncoder::new(8)), Arc::new(weights), 4)
            .unwrap();
        let mut a = sample_record("9780000000001", "Neuromancer");
        let mut b = a.clone();
        a.description = "one description".into();
        b.description = "a completely different description".into();
        let out = gen.embed(&[a, b]).await.unwrap();
        assert_eq!(out[0], out[1]);
    }

    #[tokio::test]
    async fn test_encoder_failure_fails_whole_call() {
        let gen = EmbeddingGenerator::new(
            Arc::new(FailingEncoder),
            Arc::new(FieldWeightTable::default()),
            4,
        )
        .unwrap();
        let err = gen
            .embed(&[sample_record("9780000000001", "Neuromancer")])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Encoding(_)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = EmbeddingGenerator::new(
            Arc::new(HashEncoder::new(4)),
            Arc::new(FieldWeightTable::default()),
            0,
        );
        assert!(matches!(result, Err(SyncError::InvalidArgument(_))));
    }
}
