//! Tenant isolation and cancellation.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use graphrag_rs::driver::memory::MemoryObjectStore;
use graphrag_rs::embedder::{Embedding, EmbedderClient};
use graphrag_rs::{
    Entity, ErrorKind, ExtractionOptions, GraphConfig, GraphError, KnowledgeGraph, PathOptions,
    ReadOptions, RequestContext, SearchMode, SearchOptions, StoreOptions, TraversalOptions,
};

use helpers::{ctx, plain_graph, seed_team, MockLlm};

fn keyword() -> SearchOptions {
    SearchOptions::default().with_mode(SearchMode::Keyword)
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_entity_in_one_tenant_is_invisible_to_another() {
    let (graph, _) = plain_graph();
    seed_team(&graph, &StoreOptions::default().with_tenant("tenant-a")).await;

    let a = ReadOptions::default().with_tenant("tenant-a");
    let b = ReadOptions::default().with_tenant("tenant-b");
    assert!(graph.get_entity(&ctx(), "alice", &a).await.is_ok());
    let err = graph.get_entity(&ctx(), "alice", &b).await.unwrap_err();
    assert!(err.is_not_found());

    let hits = graph.search(&ctx(), "rust", 10, &keyword().with_tenant("tenant-b")).await.unwrap();
    assert!(hits.is_empty());

    let err = graph
        .traverse_from(&ctx(), "alice", 2, &TraversalOptions::default().with_tenant("tenant-b"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::EntityNotFound(_)));

    let err = graph
        .shortest_path(&ctx(), "alice", "bob", &PathOptions::default().with_tenant("tenant-b"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_same_id_in_two_tenants_stays_separate() {
    let (graph, _) = plain_graph();
    graph
        .store_entities(&ctx(), vec![Entity::new("e", "Alpha", "T")], &StoreOptions::default().with_tenant("a"))
        .await
        .unwrap();
    graph
        .store_entities(&ctx(), vec![Entity::new("e", "Beta", "T")], &StoreOptions::default().with_tenant("b"))
        .await
        .unwrap();

    graph
        .delete_entity(&ctx(), "e", &ReadOptions::default().with_tenant("a"))
        .await
        .unwrap();
    let b = graph.get_entity(&ctx(), "e", &ReadOptions::default().with_tenant("b")).await.unwrap();
    assert_eq!(b.name, "Beta");
}

#[tokio::test]
async fn test_tenant_resolution_order() {
    let backend = Arc::new(MemoryObjectStore::new());
    let config = GraphConfig { default_tenant: Some("default-org".to_string()), ..GraphConfig::default() };
    let graph = KnowledgeGraph::new(backend, None, config);

    // configured default
    graph.store_entities(&ctx(), vec![Entity::new("d", "D", "T")], &StoreOptions::default()).await.unwrap();
    // context beats default
    let scoped = ctx().with_tenant("ctx-org");
    graph.store_entities(&scoped, vec![Entity::new("c", "C", "T")], &StoreOptions::default()).await.unwrap();
    // explicit beats context
    graph
        .store_entities(&scoped, vec![Entity::new("x", "X", "T")], &StoreOptions::default().with_tenant("explicit-org"))
        .await
        .unwrap();

    let read = |t: &str| ReadOptions::default().with_tenant(t);
    assert_eq!(graph.get_entity(&ctx(), "d", &read("default-org")).await.unwrap().tenant.as_deref(), Some("default-org"));
    assert_eq!(graph.get_entity(&ctx(), "c", &read("ctx-org")).await.unwrap().tenant.as_deref(), Some("ctx-org"));
    assert_eq!(graph.get_entity(&ctx(), "x", &read("explicit-org")).await.unwrap().tenant.as_deref(), Some("explicit-org"));
    assert!(graph.get_entity(&ctx(), "c", &ReadOptions::default()).await.is_err());
}

#[tokio::test]
async fn test_unscoped_reads_see_every_tenant() {
    let (graph, _) = plain_graph();
    graph
        .store_entities(&ctx(), vec![Entity::new("e", "E", "T")], &StoreOptions::default().with_tenant("a"))
        .await
        .unwrap();
    let e = graph.get_entity(&ctx(), "e", &ReadOptions::default()).await.unwrap();
    assert_eq!(e.tenant.as_deref(), Some("a"));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancelled_context_writes_nothing() {
    let (graph, backend) = plain_graph();
    let token = CancellationToken::new();
    token.cancel();
    let cancelled = RequestContext::background().with_cancellation(token);

    let err = graph
        .store_entities(&cancelled, vec![Entity::new("e", "E", "T")], &StoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(backend.request_count(), 0);
    assert!(backend.is_empty("KnowledgeEntity"));
}

/// Embedder that never answers.
struct HangingEmbedder;

#[async_trait]
impl EmbedderClient for HangingEmbedder {
    async fn embed(&self, _text: &str) -> graphrag_rs::Result<Embedding> {
        std::future::pending().await
    }

    async fn embed_batch(&self, _texts: &[&str]) -> graphrag_rs::Result<Vec<Embedding>> {
        std::future::pending().await
    }

    fn dim(&self) -> usize {
        8
    }
}

#[tokio::test]
async fn test_cancel_mid_flight_aborts_with_cancelled() {
    let backend = Arc::new(MemoryObjectStore::new());
    let graph = KnowledgeGraph::new(backend.clone(), Some(Arc::new(HangingEmbedder)), GraphConfig::default());
    let token = CancellationToken::new();
    let cancelled = RequestContext::background().with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    // Hybrid search does not fall back to keyword on cancellation.
    let err = graph.search(&cancelled, "anything", 5, &SearchOptions::default()).await.unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_cancelled_extraction_is_not_wrapped() {
    let (graph, _) = plain_graph();
    let token = CancellationToken::new();
    token.cancel();
    let llm = MockLlm::replying("{}");

    let err = graph
        .extract_from_text(
            &RequestContext::background().with_cancellation(token),
            "text",
            &llm,
            &ExtractionOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    assert_eq!(llm.calls(), 0);
}
