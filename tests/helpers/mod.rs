#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use graphrag_rs::driver::memory::MemoryObjectStore;
use graphrag_rs::embedder::{Embedding, EmbedderClient};
use graphrag_rs::llm_client::{LlmClient, Message};
use graphrag_rs::utils::{normalize_l2, tokenize};
use graphrag_rs::{
    Entity, GraphConfig, GraphError, KnowledgeGraph, Relationship, RequestContext, Result,
    StoreOptions,
};

pub const HASH_DIM: usize = 256;

/// Bag-of-words embedder: FNV-1a hashes each token into a bucket, then L2-normalises.
///
/// Texts sharing words get a positive cosine; unrelated texts land near zero.
#[derive(Debug, Default)]
pub struct HashingEmbedder {
    pub calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn vector(text: &str) -> Embedding {
        let mut v = vec![0.0_f32; HASH_DIM];
        for token in tokenize(text) {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            v[(hash % HASH_DIM as u64) as usize] += 1.0;
        }
        normalize_l2(&v)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbedderClient for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dim(&self) -> usize {
        HASH_DIM
    }
}

/// Embedder whose every call fails.
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbedderClient for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(GraphError::Embedder("embedding service unavailable".to_string()))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(GraphError::Embedder("embedding service unavailable".to_string()))
    }

    fn dim(&self) -> usize {
        HASH_DIM
    }
}

/// LLM returning a canned reply and recording every conversation it receives.
#[derive(Debug)]
pub struct MockLlm {
    reply: std::result::Result<String, String>,
    calls: AtomicUsize,
    pub prompts: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self { reply: Ok(reply.into()), calls: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { reply: Err(message.into()), calls: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .last()
            .and_then(|m| m.last())
            .map(|m| m.content.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(messages.to_vec());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(GraphError::Llm(graphrag_rs::LlmError::Api {
                code: None,
                message: message.clone(),
            })),
        }
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::background()
}

/// Graph over a fresh memory backend; the backend is returned for inspection.
pub fn graph_with(embedder: Option<Arc<dyn EmbedderClient>>) -> (KnowledgeGraph, Arc<MemoryObjectStore>) {
    let backend = Arc::new(MemoryObjectStore::new());
    let graph = KnowledgeGraph::new(backend.clone(), embedder, GraphConfig::default());
    (graph, backend)
}

pub fn plain_graph() -> (KnowledgeGraph, Arc<MemoryObjectStore>) {
    graph_with(None)
}

pub fn embedded_graph() -> (KnowledgeGraph, Arc<MemoryObjectStore>) {
    graph_with(Some(Arc::new(HashingEmbedder::default())))
}

/// Small team graph:
///
/// ```text
/// alice -WORKS_ON-> apollo <-MANAGES- bob      carol -KNOWS-> alice      dave
/// ```
pub async fn seed_team(graph: &KnowledgeGraph, opts: &StoreOptions) {
    let ctx = ctx();
    graph
        .store_entities(
            &ctx,
            vec![
                Entity::new("alice", "Alice", "Person").with_description("Backend engineer who writes Rust"),
                Entity::new("bob", "Bob", "Person").with_description("Engineering manager"),
                Entity::new("carol", "Carol", "Person").with_description("Designer"),
                Entity::new("dave", "Dave", "Person").with_description("Works alone"),
                Entity::new("apollo", "Apollo", "Project").with_description("Graph database rewrite in Rust"),
            ],
            opts,
        )
        .await
        .expect("seed entities");
    graph
        .store_relationships(
            &ctx,
            vec![
                Relationship::new("r-works", "alice", "apollo", "WORKS_ON").with_strength(0.9),
                Relationship::new("r-manages", "bob", "apollo", "MANAGES"),
                Relationship::new("r-knows", "carol", "alice", "KNOWS").with_strength(0.4),
            ],
            opts,
        )
        .await
        .expect("seed relationships");
}

pub fn ids(entities: &[Entity]) -> Vec<&str> {
    let mut ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    ids.sort_unstable();
    ids
}
