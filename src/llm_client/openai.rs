//! OpenAI LLM client implementation.
//!
//! Uses `async-openai` for API calls, `moka` for response caching, and
//! `backoff` for exponential-backoff retry on rate limits / transient errors.

use std::time::Duration;

use async_openai::error::OpenAIError;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use moka::future::Cache;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::{GraphError, LlmError, Result};
use crate::types::GraphConfig;

use super::{LlmClient, Message};

// ── Cache configuration ───────────────────────────────────────────────────────

/// Configuration for the in-process response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory.
    pub max_capacity: u64,
    /// How long each entry lives before eviction.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Duration::from_secs(3_600),
        }
    }
}

// ── Client struct ─────────────────────────────────────────────────────────────

/// OpenAI chat client implementing [`LlmClient`].
pub struct OpenAiClient {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_budget: Duration,
    /// Keyed by `md5(model + messages)` → response text.
    cache: Cache<String, String>,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_key` – OpenAI secret key.
    /// * `model`   – Model name (e.g. `"gpt-4o"`).
    /// * `cache_config` – Cache capacity and TTL.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        cache_config: CacheConfig,
    ) -> Self {
        let config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
        Self::with_openai_config(config, model, cache_config)
    }

    /// Create a client against a custom API base.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        cache_config: CacheConfig,
    ) -> Self {
        let config = async_openai::config::OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Self::with_openai_config(config, model, cache_config)
    }

    /// Build a client from [`GraphConfig`]'s API key and chat model.
    pub fn from_config(config: &GraphConfig, cache_config: CacheConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| GraphError::Validation("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, config.model_name.clone(), cache_config))
    }

    fn with_openai_config(
        config: async_openai::config::OpenAIConfig,
        model: impl Into<String>,
        cache_config: CacheConfig,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_config.max_capacity)
            .time_to_live(cache_config.ttl)
            .build();

        Self {
            client: async_openai::Client::with_config(config),
            model: model.into(),
            temperature: 0.0,
            max_tokens: 4_096,
            retry_budget: Duration::from_secs(300),
            cache,
        }
    }

    /// Override the sampling temperature (default `0.0`).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the max output token limit (default `4096`).
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the total time spent retrying one request (default 300 s).
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn cache_key(&self, messages: &[Message]) -> String {
        use md5::{Digest, Md5};
        let mut h = Md5::new();
        h.update(self.model.as_bytes());
        for m in messages {
            h.update(m.role.as_str().as_bytes());
            h.update([0u8]);
            h.update(m.content.as_bytes());
            h.update([0u8]);
        }
        format!("{:x}", h.finalize())
    }

    fn messages_to_json(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect()
    }

    /// Call the chat completions endpoint, retrying rate limits and 5xx-class failures.
    async fn call_with_retry(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(Some(self.retry_budget))
            .build();

        backoff::future::retry(backoff, || async {
            let outcome: std::result::Result<serde_json::Value, OpenAIError> =
                self.client.chat().create_byot(request.clone()).await;

            outcome.map_err(|e| {
                let llm_err = map_openai_error(e);
                match &llm_err {
                    LlmError::RateLimit => {
                        warn!("OpenAI rate limit hit, retrying with backoff");
                        backoff::Error::transient(llm_err)
                    }
                    LlmError::Api { code: Some(code), .. } if code == "server_error" => {
                        warn!(code = %code, "OpenAI transient server error, retrying");
                        backoff::Error::transient(llm_err)
                    }
                    _ => backoff::Error::permanent(llm_err),
                }
            })
        })
        .await
        .map_err(GraphError::Llm)
    }

    fn extract_content(response: &serde_json::Value) -> Result<String> {
        response["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .ok_or(GraphError::Llm(LlmError::EmptyResponse))
    }
}

// ── LlmClient implementation ──────────────────────────────────────────────────

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let key = self.cache_key(messages);

        if let Some(cached) = self.cache.get(&key).await {
            debug!("LLM cache hit");
            return Ok(cached);
        }

        let request = json!({
            "model": self.model,
            "messages": Self::messages_to_json(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self.call_with_retry(request).await?;
        let content = Self::extract_content(&response)?;

        self.cache.insert(key, content.clone()).await;

        Ok(content)
    }
}

/// Map an [`OpenAIError`] onto [`LlmError`] using the API error code/type.
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.clone();
            let kind = api_err.r#type.clone().unwrap_or_default();
            match code.as_deref() {
                Some("rate_limit_exceeded") => LlmError::RateLimit,
                Some("invalid_api_key") => LlmError::Authentication,
                _ if kind == "authentication_error" => LlmError::Authentication,
                _ if kind == "server_error" => LlmError::Api {
                    code: Some("server_error".to_string()),
                    message: api_err.message,
                },
                _ => LlmError::Api { code, message: api_err.message },
            }
        }
        other => LlmError::Api { code: None, message: other.to_string() },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
