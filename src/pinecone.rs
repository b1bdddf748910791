//! Pinecone vector index over its data-plane REST API.
//!
//! ```toml
//! [vector_index]
//! host = "books-abc123.svc.us-east-1-aws.pinecone.io"
//! namespace = "catalog"        # optional
//! ```
//!
//! The API key is read from `PINECONE_API_KEY`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VectorIndexConfig;
use crate::traits::{IndexVector, VectorIndex};

const API_VERSION: &str = "2024-07";

/// [`VectorIndex`] backed by one Pinecone index (and optional namespace).
pub struct PineconeIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    namespace: Option<String>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexVector],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    delete_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeIndex {
    /// Create an index client with the API key from `PINECONE_API_KEY`.
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .context("PINECONE_API_KEY environment variable not set")?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &VectorIndexConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let host = config.host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            client,
            base_url,
            api_key,
            namespace: config.namespace.clone(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Pinecone request to {} failed", url))
    }

    async fn delete_request(&self, request: &DeleteRequest<'_>) -> Result<reqwest::Response> {
        self.post("/vectors/delete", request).await
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, vectors: &[IndexVector]) -> Result<usize> {
        if vectors.is_empty() {
            return Ok(0);
        }
        let request = UpsertRequest {
            vectors,
            namespace: self.namespace.as_deref(),
        };
        let resp = self.post("/vectors/upsert", &request).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone upsert error ({}): {}", status, body);
        }

        let parsed: UpsertResponse = resp
            .json()
            .await
            .context("Failed to parse Pinecone upsert response")?;
        tracing::debug!(upserted = parsed.upserted_count, "pinecone upsert");
        Ok(parsed.upserted_count)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let resp = self
            .delete_request(&DeleteRequest {
                ids: Some(ids),
                delete_all: false,
                namespace: self.namespace.as_deref(),
            })
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone delete error ({}): {}", status, body);
        }
        Ok(ids.len())
    }

    async fn delete_all(&self) -> Result<()> {
        let resp = self
            .delete_request(&DeleteRequest {
                ids: None,
                delete_all: true,
                namespace: self.namespace.as_deref(),
            })
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!("no vectors to delete in Pinecone index");
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone delete-all error ({}): {}", status, body);
        }
        Ok(())
    }
}
