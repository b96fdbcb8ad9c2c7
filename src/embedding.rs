//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledEmbeddings`]** — always unavailable; used when no provider
//!   is configured.
//! - **[`HttpEmbeddingProvider`]** — calls an OpenAI-compatible embeddings
//!   endpoint (OpenRouter by default) with a hard request timeout.
//!
//! Degradation policy lives in [`embed_with_fallback`], not in the providers:
//! inputs are batched by the configured batch size, a failed batch is retried
//! once after a short backoff, and a batch that fails both attempts is
//! replaced by zero-vectors of the provider's dimension — for that batch
//! only. The rest of the pipeline sees identically-shaped output either way;
//! each output carries a `degraded` flag so ingestion can record which chunks
//! lost semantic quality.
//!
//! Also provides [`cosine_similarity`], the similarity metric used by the
//! vector index (embedding magnitude is not assumed meaningful).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, order-preserving.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embedding vector dimensionality. Constant for the provider's lifetime.
    fn dims(&self) -> usize;

    /// Provider identifier for logs.
    fn name(&self) -> &str;
}

/// One embedded text: the vector plus whether it came from the fallback.
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    pub vector: Vec<f32>,
    pub degraded: bool,
}

/// Embed `texts` in batches with per-batch retry and zero-vector fallback.
///
/// Never fails: a batch whose retry also fails degrades to zero-vectors of
/// `provider.dims()` while other batches keep their real embeddings. Output
/// order matches input order.
pub async fn embed_with_fallback(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Vec<EmbedOutcome> {
    let mut out = Vec::with_capacity(texts.len());
    let batch_size = config.batch_size.max(1);

    for batch in texts.chunks(batch_size) {
        match embed_batch_once_retried(provider, config, batch).await {
            Ok(vectors) => {
                out.extend(vectors.into_iter().map(|vector| EmbedOutcome {
                    vector,
                    degraded: false,
                }));
            }
            Err(e) => {
                match &e {
                    ProviderError::Timeout(secs) => tracing::warn!(
                        provider = provider.name(),
                        timeout_secs = secs,
                        batch_len = batch.len(),
                        "embedding batch timed out, using zero-vector fallback"
                    ),
                    other => tracing::warn!(
                        provider = provider.name(),
                        batch_len = batch.len(),
                        error = %other,
                        "embedding batch failed, using zero-vector fallback"
                    ),
                }
                out.extend(batch.iter().map(|_| EmbedOutcome {
                    vector: vec![0.0; provider.dims()],
                    degraded: true,
                }));
            }
        }
    }

    out
}

/// Embed a single query text. Returns `None` when the provider is degraded —
/// a zero-vector query cannot rank anything and the caller should fall back
/// to lexical retrieval instead.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Option<Vec<f32>> {
    let mut outcomes = embed_with_fallback(provider, config, &[text.to_string()]).await;
    let outcome = outcomes.pop()?;
    if outcome.degraded {
        None
    } else {
        Some(outcome.vector)
    }
}

/// One attempt plus a single backoff retry, validating the response shape.
async fn embed_batch_once_retried(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    batch: &[String],
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let mut last_err = None;

    for attempt in 0..2 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
        }
        match provider.embed(batch).await {
            Ok(vectors) => {
                if vectors.len() != batch.len() {
                    return Err(ProviderError::Malformed(format!(
                        "expected {} vectors, got {}",
                        batch.len(),
                        vectors.len()
                    )));
                }
                if let Some(v) = vectors.iter().find(|v| v.len() != provider.dims()) {
                    return Err(ProviderError::Malformed(format!(
                        "expected dimension {}, got {}",
                        provider.dims(),
                        v.len()
                    )));
                }
                return Ok(vectors);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("no attempts made".to_string())))
}

// ============ Disabled Provider ============

/// An embedding provider that is never available.
///
/// Used when `embedding.provider = "disabled"`. Every call reports
/// [`ProviderError::Unavailable`], which [`embed_with_fallback`] converts
/// into zero-vectors — so a session with no embedding backend at all still
/// produces dimensionally-consistent chunks and falls back to lexical
/// retrieval at question time.
pub struct DisabledEmbeddings {
    dims: usize,
}

impl DisabledEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddings {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Unavailable(
            "embedding provider is disabled".to_string(),
        ))
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============ HTTP Provider ============

/// Embedding provider for OpenAI-compatible APIs (OpenRouter, OpenAI).
///
/// Calls `POST {base_url}/embeddings` with bearer auth. The request timeout
/// is enforced by the HTTP client; a missing API key surfaces as
/// `Unavailable` at call time rather than failing construction, so the
/// pipeline degrades instead of refusing to start.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dims: usize,
    timeout_secs: u64,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let model = config.model.clone().ok_or_else(|| {
            ProviderError::Unavailable("embedding.model not configured".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            api_key: config.api_key.clone(),
            dims: config.dims,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::Unavailable("embedding api_key not configured".to_string())
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else {
                    ProviderError::Unavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "embeddings API returned {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_embeddings_response(&json)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[].embedding` arrays from an OpenAI-style response, in order.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::Malformed("missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ProviderError::Malformed("missing embedding".to_string()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

/// Create the appropriate [`EmbeddingProvider`] for the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    if !config.is_enabled() {
        return Arc::new(DisabledEmbeddings::new(config.dims));
    }
    match HttpEmbeddingProvider::new(config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::warn!(error = %e, "embedding provider misconfigured, running disabled");
            Arc::new(DisabledEmbeddings::new(config.dims))
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors (the fallback embeddings).
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
