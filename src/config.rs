use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::key::DEFAULT_THUMBNAIL_PREFIX;
use crate::weights::{Field, FieldWeightTable};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    pub object_store: Option<ObjectStoreConfig>,
    pub document_store: Option<DocumentStoreConfig>,
    pub vector_index: Option<VectorIndexConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_transfer_concurrency")]
    pub transfer_concurrency: usize,
    #[serde(default = "default_document_batch_size")]
    pub document_batch_size: usize,
    #[serde(default = "default_vector_batch_size")]
    pub vector_batch_size: usize,
    #[serde(default = "default_record_chunk_size")]
    pub record_chunk_size: usize,
    #[serde(default = "default_thumbnail_prefix")]
    pub thumbnail_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transfer_concurrency: default_transfer_concurrency(),
            document_batch_size: default_document_batch_size(),
            vector_batch_size: default_vector_batch_size(),
            record_chunk_size: default_record_chunk_size(),
            thumbnail_prefix: default_thumbnail_prefix(),
            fetch_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_transfer_concurrency() -> usize {
    10
}
fn default_document_batch_size() -> usize {
    1000
}
fn default_vector_batch_size() -> usize {
    100
}
fn default_record_chunk_size() -> usize {
    1000
}
fn default_thumbnail_prefix() -> String {
    DEFAULT_THUMBNAIL_PREFIX.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentStoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexConfig {
    pub host: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub weights: Option<BTreeMap<Field, f32>>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            weights: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The weight table to embed with: the override if configured,
    /// otherwise the default weights.
    pub fn weight_table(&self) -> Result<FieldWeightTable> {
        match &self.weights {
            Some(map) => FieldWeightTable::from_map(map).context("Invalid [embedding.weights]"),
            None => Ok(FieldWeightTable::default()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate sync sizing
    let sizes = [
        ("sync.transfer_concurrency", config.sync.transfer_concurrency),
        ("sync.document_batch_size", config.sync.document_batch_size),
        ("sync.vector_batch_size", config.sync.vector_batch_size),
        ("sync.record_chunk_size", config.sync.record_chunk_size),
        ("embedding.batch_size", config.embedding.batch_size),
    ];
    for (name, value) in sizes {
        if value == 0 {
            anyhow::bail!("{} must be >= 1", name);
        }
    }

    if let Some(os) = &config.object_store {
        if os.bucket.trim().is_empty() {
            anyhow::bail!("object_store.bucket must not be empty");
        }
    }

    if let Some(vi) = &config.vector_index {
        if vi.host.trim().is_empty() {
            anyhow::bail!("vector_index.host must not be empty");
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        "disabled" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    config.embedding.weight_table()?;

    Ok(())
}
