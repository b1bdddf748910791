//! Text encoder abstraction and implementations.
//!
//! Defines the [`TextEncoder`] capability and concrete implementations:
//! - **[`DisabledEncoder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIEncoder`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaEncoder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEncoder`**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! The weighted, multi-field record embedding built on top of an encoder
//! lives in [`weighted`].
//!
//! # Encoder Selection
//!
//! ```rust
//! # use catalog_sync::config::EmbeddingConfig;
//! # use catalog_sync::embedding::create_encoder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let encoder = create_encoder(&config).unwrap();
//! assert_eq!(encoder.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama encoders use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

pub mod weighted;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// A text-encoding model: maps each input text to a fixed-dimension vector.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the native output dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Encode texts, returning one vector per input in the same order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Disabled Encoder ============

/// An encoder that always fails.
///
/// Used when `embedding.provider = "disabled"`.
pub struct DisabledEncoder;

#[async_trait]
impl TextEncoder for DisabledEncoder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ Shared HTTP plumbing ============

/// Model, dimensionality and HTTP client shared by the remote encoders.
struct RemoteModel {
    model: String,
    dims: usize,
    endpoint: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl RemoteModel {
    fn from_config(
        config: &EmbeddingConfig,
        provider: &str,
        default_base: &str,
        path: &str,
    ) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for {} provider", provider))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for {} provider", provider))?;
        let base = config.url.as_deref().unwrap_or(default_base);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            model,
            dims,
            endpoint: format!("{}{}", base.trim_end_matches('/'), path),
            max_retries: config.max_retries,
            client,
        })
    }

    /// POST `{model, input}` and decode the reply, retrying 429, 5xx and
    /// connection errors with exponential backoff.
    async fn post<T: DeserializeOwned>(
        &self,
        texts: &[String],
        bearer: Option<&str>,
        label: &str,
    ) -> Result<T> {
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "{} retrying", label);
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.post(&self.endpoint).json(&body);
            if let Some(token) = bearer {
                req = req.bearer_auth(token);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(anyhow!("{} connection error: {}", label, e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .with_context(|| format!("Invalid {} embedding response", label));
            }

            let text = response.text().await.unwrap_or_default();
            let err = anyhow!("{} API error {}: {}", label, status, text);
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

// ============ OpenAI Encoder ============

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIResponse {
    /// Vectors in input order; the API does not promise ordered `data`.
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

/// Encoder using the OpenAI embeddings API (`POST /v1/embeddings`).
///
/// Requires `OPENAI_API_KEY`.
pub struct OpenAIEncoder {
    remote: RemoteModel,
    api_key: String,
}

impl OpenAIEncoder {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let remote =
            RemoteModel::from_config(config, "OpenAI", "https://api.openai.com", "/v1/embeddings")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self { remote, api_key })
    }
}

#[async_trait]
impl TextEncoder for OpenAIEncoder {
    fn model_name(&self) -> &str {
        &self.remote.model
    }
    fn dims(&self) -> usize {
        self.remote.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let resp: OpenAIResponse = self
            .remote
            .post(texts, Some(&self.api_key), "OpenAI")
            .await?;
        Ok(resp.into_vectors())
    }
}

// ============ Ollama Encoder ============

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Encoder using a local Ollama instance (`POST /api/embed`, default
/// `http://localhost:11434`).
pub struct OllamaEncoder {
    remote: RemoteModel,
}

impl OllamaEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            remote: RemoteModel::from_config(
                config,
                "Ollama",
                "http://localhost:11434",
                "/api/embed",
            )?,
        })
    }
}

#[async_trait]
impl TextEncoder for OllamaEncoder {
    fn model_name(&self) -> &str {
        &self.remote.model
    }
    fn dims(&self) -> usize {
        self.remote.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let resp: OllamaResponse = self.remote.post(texts, None, "Ollama").await?;
        Ok(resp.embeddings)
    }
}

// ============ Local Encoder (fastembed) ============

/// Encoder for local inference via fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached;
/// after that, encoding runs entirely offline on a blocking thread.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEncoder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let dims = config.dims.unwrap_or_else(|| default_local_dims(&model_name));
        let fastembed_model = config_to_fastembed_model(&model_name)?;

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl TextEncoder for LocalEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("Local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn default_local_dims(model_name: &str) -> usize {
    match model_name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        _ => 384,
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ),
    }
}

/// Create the [`TextEncoder`] selected by configuration.
///
/// | Config Value | Encoder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEncoder`] |
/// | `"openai"` | [`OpenAIEncoder`] |
/// | `"ollama"` | [`OllamaEncoder`] |
/// | `"local"` | `LocalEncoder` (requires `local-embeddings-fastembed`) |
pub fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn TextEncoder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEncoder)),
        "openai" => Ok(Arc::new(OpenAIEncoder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEncoder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEncoder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
