//! TOML configuration parsing and validation.
//!
//! All provider settings — including API keys — live here and are passed
//! explicitly into provider constructors. Nothing in the library reads
//! ambient environment state at call time, so fallback behavior stays
//! deterministic and testable. The CLI binary may copy an environment
//! variable into the loaded config before constructing the engine; that is
//! the only place the environment is consulted.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub qa: QaConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in bytes of normalized text.
    pub target_chars: usize,
    /// Overlap carried from the previous chunk, in bytes.
    pub overlap_chars: usize,
    /// Tail chunks smaller than this are merged into their predecessor.
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: 1000,
            overlap_chars: 200,
            min_chunk_chars: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"openrouter"` (any OpenAI-compatible embeddings API).
    pub provider: String,
    pub base_url: String,
    pub model: Option<String>,
    /// Embedding vector dimensionality. Fixed per session; the zero-vector
    /// fallback produces vectors of the same width.
    pub dims: usize,
    pub api_key: Option<String>,
    /// Maximum texts per API call; larger inputs are split into batches.
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Backoff before the single per-batch retry.
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: None,
            dims: 1536,
            api_key: None,
            batch_size: 100,
            timeout_secs: 30,
            retry_backoff_ms: 500,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    /// `"disabled"` or `"openrouter"` (any OpenAI-compatible chat API).
    pub provider: String,
    pub base_url: String,
    pub primary_model: String,
    /// Tried when the primary model errors; the extractive fallback only
    /// engages after both fail.
    pub fallback_model: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            primary_model: "anthropic/claude-sonnet-4".to_string(),
            fallback_model: Some("openai/gpt-4o".to_string()),
            api_key: None,
            max_tokens: 2048,
            temperature: 0.1,
            timeout_secs: 30,
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QaConfig {
    /// Chunks placed into the grounding prompt (top-K).
    pub max_context_chunks: usize,
    /// Conversation turns retained per document; older turns are dropped.
    pub max_history_turns: usize,
    /// Minimum keyword-overlap ratio for a lexical candidate to count.
    pub min_lexical_score: f32,
    /// Longest excerpt used by the extractive fallback answer.
    pub excerpt_chars: usize,
    pub no_answer_text: String,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            max_context_chunks: 5,
            max_history_turns: 10,
            min_lexical_score: 0.1,
            excerpt_chars: 500,
            no_answer_text: "I cannot find this information in the document.".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Document time-to-live, fixed at ingestion.
    pub ttl_secs: u64,
    /// Per-session document cap; oldest evicted first on overflow.
    pub max_documents: usize,
    /// Interval of the background expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_documents: 5,
            sweep_interval_secs: 300,
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
    if config.chunking.target_chars == 0 {
        anyhow::bail!("chunking.target_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.target_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.target_chars");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openrouter" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openrouter.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
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
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.generation.provider.as_str() {
        "disabled" | "openrouter" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openrouter.",
            other
        ),
    }

    if config.qa.max_context_chunks == 0 {
        anyhow::bail!("qa.max_context_chunks must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.qa.min_lexical_score) {
        anyhow::bail!("qa.min_lexical_score must be in [0.0, 1.0]");
    }

    if config.session.max_documents == 0 {
        anyhow::bail!("session.max_documents must be >= 1");
    }

    Ok(())
}
