//! Embedding client abstraction and vector utilities.
//!
//! The embedding model is an external HTTP capability: query text in,
//! fixed-dimension float vector out. [`Embedder`] is the seam — the
//! server holds an `Arc<dyn Embedder>` so tests can substitute a stub
//! and assert that access denial short-circuits before any embedding
//! call happens.
//!
//! Also provides vector utilities for BLOB-stored embeddings:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The remote provider retries transient failures with exponential
//! backoff (1s, 2s, 4s, 8s, 16s, 32s, capped at 2^5):
//! - HTTP 429 and 5xx → retry
//! - HTTP 4xx (not 429) → fail immediately
//! - Network errors → retry
//!
//! Exhausted retries surface as a single upstream error; the search core
//! never retries beyond this transport policy.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Result, ScriptoriumError};

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single query text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The corpus-wide embedding dimension this backend produces.
    fn dims(&self) -> usize;
}

/// Instantiate the embedder configured in `[embedding]`.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "remote" => Ok(Box::new(RemoteEmbedder::new(config)?)),
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Embedder ============

/// A no-op embedder used when `[embedding].provider = "disabled"`.
/// Any attempt to embed fails with a descriptive error.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(ScriptoriumError::upstream("embedding provider is disabled"))
    }

    fn dims(&self) -> usize {
        0
    }
}

// ============ Remote Embedder ============

/// Embedding provider calling an external HTTP service.
///
/// Sends `POST {url}/api/embed` with `{"model": ..., "input": [text]}`
/// and expects `{"embeddings": [[f32, ...]]}` back.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    model: Option<String>,
    dims: usize,
    max_retries: u32,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.url required for remote provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for remote provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            ScriptoriumError::upstream(format!("invalid embedding response: {}", e))
                        })?;
                        let vector = parse_embed_response(&json)?;
                        if vector.len() != self.dims {
                            return Err(ScriptoriumError::DimensionMismatch {
                                expected: self.dims,
                                actual: vector.len(),
                            });
                        }
                        return Ok(vector);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("embedding service error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(ScriptoriumError::upstream(format!(
                        "embedding service error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(format!(
                        "embedding service unreachable at {}: {}",
                        self.url, e
                    ));
                    continue;
                }
            }
        }

        Err(ScriptoriumError::upstream(
            last_err.unwrap_or_else(|| "embedding failed after retries".to_string()),
        ))
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse `{"embeddings": [[f32, ...]]}` and return the first vector.
fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|a| a.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            ScriptoriumError::upstream("invalid embedding response: missing embeddings array")
        })?;

    Ok(first
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB of 4-byte little-endian values,
/// `vec.len() × 4` bytes total.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
