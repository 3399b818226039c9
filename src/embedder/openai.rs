//! OpenAI embedding client.
//!
//! Chunked batch requests through [`async_openai`], retried with exponential
//! back-off when the failure looks like a network hiccup.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs, Client,
};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use tracing::debug;

use crate::embedder::{EmbedderClient, Embedding};
use crate::errors::{GraphError, Result};

/// Default embedding model name.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Maximum number of inputs per OpenAI embeddings API call.
const BATCH_CHUNK_SIZE: usize = 2048;

/// Embedding dimension for a model name; unknown models are assumed to be 1536-dim.
fn model_dim(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// Transient (timeouts, refused connections) vs permanent failures.
fn classify_error(err: OpenAIError) -> backoff::Error<GraphError> {
    let msg = err.to_string();
    match &err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            backoff::Error::transient(GraphError::Embedder(msg))
        }
        _ => backoff::Error::permanent(GraphError::Embedder(msg)),
    }
}

/// OpenAI embedding client that implements [`EmbedderClient`].
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dim: usize,
    max_elapsed: Duration,
}

impl OpenAiEmbedder {
    /// Create a new embedder.
    ///
    /// # Arguments
    /// * `api_key` – OpenAI API key (`sk-…`).
    /// * `model`   – Embedding model name (e.g. [`DEFAULT_MODEL`]).
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into());
        Self::with_config(config, model)
    }

    /// Create an embedder against a custom API base (proxies, compatible servers).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.into())
            .with_api_base(base_url.into());
        Self::with_config(config, model)
    }

    fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::with_config(config),
            dim: model_dim(&model),
            model,
            max_elapsed: Duration::from_secs(60),
        }
    }

    /// Override the total retry budget (default 60 s).
    pub fn with_retry_budget(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Issue a single embeddings API call for up to [`BATCH_CHUNK_SIZE`] texts.
    async fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let backoff_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build();

        let input: Vec<String> = texts.iter().map(|s| (*s).to_owned()).collect();
        let expected = input.len();
        let model = self.model.clone();
        let client = self.client.clone();

        let embeddings = retry(backoff_policy, move || {
            let input = input.clone();
            let model = model.clone();
            let client = client.clone();
            async move {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.as_str())
                    .input(input)
                    .build()
                    .map_err(|e| {
                        backoff::Error::permanent(GraphError::Embedder(e.to_string()))
                    })?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(classify_error)?;

                // The API tags each vector with its input index; order by it.
                let mut data = response.data;
                data.sort_by_key(|item| item.index);
                Ok::<_, backoff::Error<GraphError>>(
                    data.into_iter().map(|item| item.embedding).collect::<Vec<Embedding>>(),
                )
            }
        })
        .await?;

        if embeddings.len() != expected {
            return Err(GraphError::Embedder(format!(
                "expected {expected} embeddings, API returned {}",
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbedderClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_chunk(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| GraphError::Embedder("empty response from embedding API".to_string()))
    }

    /// Embed multiple texts, split into chunks of at most [`BATCH_CHUNK_SIZE`].
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_CHUNK_SIZE) {
            debug!(model = %self.model, inputs = chunk.len(), "requesting embeddings");
            result.extend(self.embed_chunk(chunk).await?);
        }
        Ok(result)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
