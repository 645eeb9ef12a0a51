//! Embedding backend abstraction and implementations.
//!
//! Defines the [`EmbeddingBackend`] trait and concrete implementations:
//! - **[`DisabledBackend`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiBackend`]** — calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaBackend`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalBackend`** — runs models locally via fastembed (behind the
//!   `local-embeddings` feature); no network calls after model download.
//!
//! Backends are constructed once at startup via [`create_backend`] and
//! injected into the pipeline, so tests can substitute a deterministic stub.
//!
//! [`IssueEmbedder`] sits on top of a backend and owns the issue-specific
//! text shaping: 3× title weighting, category prefixing, and the zero-vector
//! contract for empty input.
//!
//! Also provides vector utilities for BLOB storage and similarity:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama backends use exponential backoff for transient
//! errors: HTTP 429 and 5xx retry, other 4xx fail immediately, network
//! errors retry. Backoff doubles from 1s and caps at 32s.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::categorize::{Categorizer, Category};
use crate::config::EmbeddingConfig;

/// Trait for embedding backends.
///
/// A backend turns a batch of texts into fixed-dimension vectors. The only
/// properties the pipeline relies on are determinism (same text, same
/// vector) and a fixed [`dims`](EmbeddingBackend::dims).
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Create the appropriate backend from configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or when a provider cannot
/// be initialized (missing model, API key, or feature flag).
pub fn create_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "openai" => Ok(Arc::new(OpenAiBackend::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(local::LocalBackend::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Backend ============

/// A no-op backend that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledBackend;

#[async_trait]
impl EmbeddingBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Backend ============

/// Backend using the OpenAI embeddings API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiBackend {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config.dims.unwrap_or(1536);
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama Backend ============

/// Backend using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model pulled, e.g.
/// `ollama pull nomic-embed-text`.
pub struct OllamaBackend {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
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
                        let json: serde_json::Value = response.json().await?;
                        return parse_ollama_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err =
                            Some(anyhow::anyhow!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed after retries")))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

/// Exponential backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

// ============ Local Backend (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use std::sync::Mutex;

    /// Backend for local inference via fastembed.
    ///
    /// The model is downloaded from Hugging Face on first construction and
    /// cached; embedding then runs entirely offline.
    pub struct LocalBackend {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalBackend {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            let dims = config.dims.unwrap_or(match model_name.as_str() {
                "all-minilm-l6-v2" => 384,
                "bge-small-en-v1.5" => 384,
                "bge-base-en-v1.5" => 768,
                "nomic-embed-text-v1.5" => 768,
                _ => 384,
            });

            let fastembed_model = match model_name.as_str() {
                "all-minilm-l6-v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
                "bge-small-en-v1.5" => fastembed::EmbeddingModel::BGESmallENV15,
                "bge-base-en-v1.5" => fastembed::EmbeddingModel::BGEBaseENV15,
                "nomic-embed-text-v1.5" => fastembed::EmbeddingModel::NomicEmbedTextV15,
                other => bail!(
                    "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
                     bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
                    other
                ),
            };

            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            Ok(Self {
                model_name,
                dims,
                batch_size: config.batch_size,
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait]
    impl EmbeddingBackend for LocalBackend {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }
}

// ============ Issue-level embedding ============

/// Turns issues into embedding vectors using an injected backend.
///
/// Owns the text shaping the pipeline depends on: title weighting, category
/// prefixing, and the defined zero-vector result for empty input.
pub struct IssueEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    categorizer: Categorizer,
}

impl IssueEmbedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            categorizer: Categorizer::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.backend.dims()
    }

    /// Embed a single text. Empty or whitespace-only input yields a zero
    /// vector of the backend's dimensionality, never an error.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.backend.dims()]);
        }
        let mut vectors = self.backend.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    /// Embed an issue with the title weighted 3× relative to the body.
    pub async fn embed_issue(&self, title: &str, body: &str) -> Result<Vec<f32>> {
        self.embed_text(&weighted_issue_text(title, body)).await
    }

    /// Embed an issue with its category tag prepended, so the embedding
    /// space is implicitly partitioned by category. Index writes and
    /// classification queries must both use this form.
    pub async fn embed_issue_with_category(
        &self,
        title: &str,
        body: &str,
        category: Category,
    ) -> Result<Vec<f32>> {
        let enhanced = self.categorizer.enhance_text(title, body, category);
        self.embed_text(&enhanced).await
    }

    /// Batch embed. Produces results identical to per-item [`embed_text`]
    /// calls; empty texts map to zero vectors without touching the backend.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut non_empty: Vec<String> = Vec::new();
        let mut slots: Vec<Option<usize>> = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                slots.push(None);
            } else {
                slots.push(Some(non_empty.len()));
                non_empty.push(text.clone());
            }
        }

        let embedded = if non_empty.is_empty() {
            Vec::new()
        } else {
            self.backend.embed(&non_empty).await?
        };

        if embedded.len() != non_empty.len() {
            bail!(
                "Backend returned {} embeddings for {} texts",
                embedded.len(),
                non_empty.len()
            );
        }

        Ok(slots
            .into_iter()
            .map(|slot| match slot {
                Some(i) => embedded[i].clone(),
                None => vec![0.0; self.backend.dims()],
            })
            .collect())
    }
}

/// Issue text with the title repeated 3× ahead of the body. The title
/// carries more semantic signal than body prose.
pub fn weighted_issue_text(title: &str, body: &str) -> String {
    format!("{title} {title} {title} {body}")
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
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
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths. Callers needing the system-wide [0, 1]
/// similarity should go through [`crate::index::unit_similarity`].
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

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic backend: vector = per-dimension count of marker words.
    struct CountingBackend;

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        fn model_name(&self) -> &str {
            "counting-stub"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    vec![
                        lower.matches("alpha").count() as f32,
                        lower.matches("beta").count() as f32,
                        lower.matches("gamma").count() as f32,
                    ]
                })
                .collect())
        }
    }

    fn embedder() -> IssueEmbedder {
        IssueEmbedder::new(Arc::new(CountingBackend))
    }

    #[test]
    fn test_weighted_issue_text_triples_title() {
        let text = weighted_issue_text("alpha", "beta");
        assert_eq!(text, "alpha alpha alpha beta");
    }

    #[tokio::test]
    async fn test_empty_text_yields_zero_vector() {
        let e = embedder();
        assert_eq!(e.embed_text("").await.unwrap(), vec![0.0, 0.0, 0.0]);
        assert_eq!(e.embed_text("   \n\t").await.unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_title_weighting_reaches_backend() {
        let e = embedder();
        let v = e.embed_issue("alpha", "beta").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_batch_matches_per_item() {
        let e = embedder();
        let texts = vec![
            "alpha beta".to_string(),
            "".to_string(),
            "gamma gamma".to_string(),
        ];
        let batch = e.embed_batch(&texts).await.unwrap();
        for (text, batched) in texts.iter().zip(&batch) {
            let single = e.embed_text(text).await.unwrap();
            assert_eq!(&single, batched, "batch diverged for {text:?}");
        }
    }

    #[tokio::test]
    async fn test_category_prefix_is_embedded() {
        let e = embedder();
        // "[BUG]" itself contains no marker words, but the shaped text must
        // still flow through the backend.
        let v = e
            .embed_issue_with_category("alpha", "gamma", Category::Bug)
            .await
            .unwrap();
        assert_eq!(v, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
