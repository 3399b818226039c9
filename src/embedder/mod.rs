//! Embedder client abstraction.
//!
//! Provides a trait for generating vector embeddings from text and comparing them.
//!
//! # Implementations
//! - [`openai::OpenAiEmbedder`]: OpenAI `text-embedding-3-*` via `async-openai`.

pub mod openai;

use async_trait::async_trait;

use crate::errors::Result;
use crate::utils::SimilarityMetric;

/// A vector embedding (f32 components).
pub type Embedding = Vec<f32>;

/// Trait for text-to-vector embedding clients.
#[async_trait]
pub trait EmbedderClient: Send + Sync {
    /// Generate an embedding for a single text string.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for a batch of texts, one per input, in order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Returns the dimensionality of embeddings produced by this client.
    fn dim(&self) -> usize;

    /// Compare two embeddings produced by this client.
    fn similarity(&self, a: &[f32], b: &[f32], metric: SimilarityMetric) -> f32 {
        metric.score(a, b)
    }
}
