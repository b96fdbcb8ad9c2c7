//! Generation provider abstraction and implementations.
//!
//! Defines the [`GenerationProvider`] trait and concrete implementations:
//! - **[`DisabledGeneration`]** — always unavailable; the answer composer
//!   degrades to its deterministic extractive fallback.
//! - **[`HttpGenerationProvider`]** — calls an OpenAI-compatible chat
//!   completions endpoint (OpenRouter by default), trying a primary model
//!   first and a configured fallback model second.
//!
//! Failure signals stay distinguishable: request timeouts map to
//! [`ProviderError::Timeout`], transport and HTTP-status failures to
//! [`ProviderError::Unavailable`], and unparseable payloads to
//! [`ProviderError::Malformed`]. The answer composer treats all three as the
//! same fallback trigger but logs them differently.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::ProviderError;

/// Trait for text-generation backends.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce a completion for a system + user prompt pair.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;

    /// Provider identifier for logs.
    fn name(&self) -> &str;
}

// ============ Disabled Provider ============

/// A generation provider that is never available.
pub struct DisabledGeneration;

#[async_trait]
impl GenerationProvider for DisabledGeneration {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable(
            "generation provider is disabled".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============ HTTP Provider ============

/// Generation provider for OpenAI-compatible chat APIs (OpenRouter, OpenAI).
///
/// Calls `POST {base_url}/chat/completions` with bearer auth. When the
/// primary model fails and a fallback model is configured, the fallback is
/// tried once before the error propagates; the caller's extractive fallback
/// only engages after both. A missing API key surfaces as `Unavailable` at
/// call time rather than failing construction.
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    primary_model: String,
    fallback_model: Option<String>,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl HttpGenerationProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            primary_model: config.primary_model.clone(),
            fallback_model: config.fallback_model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn complete_with_model(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::Unavailable("generation api_key not configured".to_string())
        })?;

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
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
                "chat API returned {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        match self.complete_with_model(&self.primary_model, system, user).await {
            Ok(answer) => Ok(answer),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback_model else {
                    return Err(primary_err);
                };
                tracing::info!(
                    primary = %self.primary_model,
                    fallback = %fallback,
                    error = %primary_err,
                    "primary generation model failed, trying fallback model"
                );
                self.complete_with_model(fallback, system, user).await
            }
        }
    }

    fn name(&self) -> &str {
        &self.primary_model
    }
}

/// Extract `choices[0].message.content` from an OpenAI-style chat response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, ProviderError> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".to_string()))?;

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Malformed("empty completion".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Create the appropriate [`GenerationProvider`] for the configuration.
pub fn create_provider(config: &GenerationConfig) -> Arc<dyn GenerationProvider> {
    if !config.is_enabled() {
        return Arc::new(DisabledGeneration);
    }
    match HttpGenerationProvider::new(config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::warn!(error = %e, "generation provider misconfigured, running disabled");
            Arc::new(DisabledGeneration)
        }
    }
}
