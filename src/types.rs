//! Crate configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{GraphError, Result};

/// Central configuration, usually loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GraphConfig {
    /// Prefix shared by both collections: `{prefix}Entity`, `{prefix}Relationship`.
    #[validate(length(min = 1))]
    pub collection_prefix: String,

    /// Tenant used when neither the call nor the request context names one.
    pub default_tenant: Option<String>,

    /// Objects per backend write request.
    #[validate(range(min = 1, max = 10_000))]
    pub batch_size: usize,

    /// Generate entity embeddings on write when an embedder is configured.
    pub auto_embed: bool,

    /// OpenAI API key for the bundled providers.
    pub openai_api_key: Option<String>,

    /// Embedding model for [`crate::embedder::openai::OpenAiEmbedder`].
    #[validate(length(min = 1))]
    pub embedding_model: String,

    /// Chat model for [`crate::llm_client::openai::OpenAiClient`].
    #[validate(length(min = 1))]
    pub model_name: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            collection_prefix: "Knowledge".to_string(),
            default_tenant: None,
            batch_size: 100,
            auto_embed: true,
            openai_api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            model_name: "gpt-4o".to_string(),
        }
    }
}

impl GraphConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent).
    /// Every variable is optional; malformed values return
    /// [`GraphError::Validation`].
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `GRAPH_COLLECTION_PREFIX` | `Knowledge` |
    /// | `GRAPH_DEFAULT_TENANT` | unset |
    /// | `GRAPH_BATCH_SIZE` | `100` |
    /// | `GRAPH_AUTO_EMBED` | `true` |
    /// | `OPENAI_API_KEY` | unset |
    /// | `EMBEDDING_MODEL` | `text-embedding-3-small` |
    /// | `MODEL_NAME` | `gpt-4o` |
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let batch_size = match std::env::var("GRAPH_BATCH_SIZE") {
            Ok(val) => val.trim().parse::<usize>().map_err(|_| {
                GraphError::Validation("GRAPH_BATCH_SIZE must be a positive integer".to_string())
            })?,
            Err(_) => defaults.batch_size,
        };

        let auto_embed = match std::env::var("GRAPH_AUTO_EMBED") {
            Ok(val) => parse_bool(&val).ok_or_else(|| {
                GraphError::Validation("GRAPH_AUTO_EMBED must be true or false".to_string())
            })?,
            Err(_) => defaults.auto_embed,
        };

        let config = Self {
            collection_prefix: std::env::var("GRAPH_COLLECTION_PREFIX")
                .unwrap_or(defaults.collection_prefix),
            default_tenant: non_empty_var("GRAPH_DEFAULT_TENANT"),
            batch_size,
            auto_embed,
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            embedding_model: std::env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            model_name: std::env::var("MODEL_NAME").unwrap_or(defaults.model_name),
        };

        config.checked()
    }

    /// Run field validation, returning the config on success.
    pub fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|e| GraphError::Validation(e.to_string()))?;
        Ok(self)
    }

    pub fn entity_collection(&self) -> String {
        format!("{}Entity", self.collection_prefix)
    }

    pub fn relationship_collection(&self) -> String {
        format!("{}Relationship", self.collection_prefix)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
