//! [`KnowledgeGraph`]: one handle over storage, search, traversal,
//! extraction and schema management.

use std::sync::Arc;

use crate::context::RequestContext;
use crate::driver::memory::MemoryObjectStore;
use crate::driver::ObjectStore;
use crate::edges::{Direction, Relationship};
use crate::embedder::openai::OpenAiEmbedder;
use crate::embedder::EmbedderClient;
use crate::errors::{GraphError, Result};
use crate::extraction::{ExtractionEngine, ExtractionOptions, ExtractionResult};
use crate::llm_client::LlmClient;
use crate::nodes::Entity;
use crate::schema::{GraphSchema, SchemaManager};
use crate::search::{SearchEngine, SearchOptions, SearchResult};
use crate::store::{BatchReport, GraphStore, ReadOptions, RelationshipOptions, StoreOptions};
use crate::traversal::{GraphContext, GraphPath, PathOptions, TraversalEngine, TraversalOptions};
use crate::types::GraphConfig;

/// Knowledge graph facade.
///
/// Cloning is cheap and clones share the backend and the applied schema.
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    store: GraphStore,
    search: SearchEngine,
    traversal: TraversalEngine,
    extraction: ExtractionEngine,
    schema: SchemaManager,
}

impl KnowledgeGraph {
    pub fn new(
        backend: Arc<dyn ObjectStore>,
        embedder: Option<Arc<dyn EmbedderClient>>,
        config: GraphConfig,
    ) -> Self {
        let store = GraphStore::new(backend, embedder, config);
        let schema = SchemaManager::new(store.clone());
        Self {
            search: SearchEngine::new(store.clone()),
            traversal: TraversalEngine::new(store.clone()),
            extraction: ExtractionEngine::new(store.clone(), schema.clone()),
            schema,
            store,
        }
    }

    /// In-process graph without an embedder.
    pub fn in_memory(config: GraphConfig) -> Self {
        Self::new(Arc::new(MemoryObjectStore::new()), None, config)
    }

    /// Graph over `backend` with the OpenAI embedder named in `config`.
    pub fn with_openai_embedder(backend: Arc<dyn ObjectStore>, config: GraphConfig) -> Result<Self> {
        let config = config.checked()?;
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| GraphError::Validation("OPENAI_API_KEY is not set".to_string()))?;
        let embedder = OpenAiEmbedder::new(api_key, config.embedding_model.clone());
        Ok(Self::new(backend, Some(Arc::new(embedder)), config))
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn schema_manager(&self) -> &SchemaManager {
        &self.schema
    }

    // -- repository ---------------------------------------------------------

    pub async fn store_entities(
        &self,
        ctx: &RequestContext,
        entities: Vec<Entity>,
        opts: &StoreOptions,
    ) -> Result<BatchReport> {
        self.store.store_entities(ctx, entities, opts).await
    }

    pub async fn get_entity(&self, ctx: &RequestContext, id: &str, opts: &ReadOptions) -> Result<Entity> {
        self.store.get_entity(ctx, id, opts).await
    }

    pub async fn update_entity(
        &self,
        ctx: &RequestContext,
        entity: Entity,
        opts: &StoreOptions,
    ) -> Result<Entity> {
        self.store.update_entity(ctx, entity, opts).await
    }

    pub async fn delete_entity(&self, ctx: &RequestContext, id: &str, opts: &ReadOptions) -> Result<()> {
        self.store.delete_entity(ctx, id, opts).await
    }

    pub async fn store_relationships(
        &self,
        ctx: &RequestContext,
        relationships: Vec<Relationship>,
        opts: &StoreOptions,
    ) -> Result<BatchReport> {
        self.store.store_relationships(ctx, relationships, opts).await
    }

    pub async fn get_relationships(
        &self,
        ctx: &RequestContext,
        entity_id: &str,
        direction: Direction,
        opts: &RelationshipOptions,
    ) -> Result<Vec<Relationship>> {
        self.store.get_relationships(ctx, entity_id, direction, opts).await
    }

    pub async fn get_relationship(
        &self,
        ctx: &RequestContext,
        id: &str,
        opts: &ReadOptions,
    ) -> Result<Relationship> {
        self.store.get_relationship(ctx, id, opts).await
    }

    pub async fn delete_relationship(
        &self,
        ctx: &RequestContext,
        id: &str,
        opts: &ReadOptions,
    ) -> Result<()> {
        self.store.delete_relationship(ctx, id, opts).await
    }

    // -- search -------------------------------------------------------------

    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        limit: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.search.search(ctx, query, limit, opts).await
    }

    pub async fn local_search(
        &self,
        ctx: &RequestContext,
        query: &str,
        entity_id: Option<&str>,
        depth: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.search.local_search(ctx, query, entity_id, depth, opts).await
    }

    pub async fn global_search(
        &self,
        ctx: &RequestContext,
        query: &str,
        community_level: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.search.global_search(ctx, query, community_level, opts).await
    }

    // -- traversal ----------------------------------------------------------

    pub async fn traverse_from(
        &self,
        ctx: &RequestContext,
        entity_id: &str,
        depth: usize,
        opts: &TraversalOptions,
    ) -> Result<GraphContext> {
        self.traversal.traverse_from(ctx, entity_id, depth, opts).await
    }

    pub async fn shortest_path(
        &self,
        ctx: &RequestContext,
        source_id: &str,
        target_id: &str,
        opts: &PathOptions,
    ) -> Result<GraphPath> {
        self.traversal.shortest_path(ctx, source_id, target_id, opts).await
    }

    // -- extraction & schema ------------------------------------------------

    pub async fn extract_from_text(
        &self,
        ctx: &RequestContext,
        text: &str,
        llm: &dyn LlmClient,
        opts: &ExtractionOptions,
    ) -> Result<ExtractionResult> {
        self.extraction.extract_from_text(ctx, text, llm, opts).await
    }

    pub fn apply_schema(&self, schema: GraphSchema) {
        self.schema.apply_schema(schema);
    }

    pub async fn discover_schema(&self, ctx: &RequestContext, tenant: Option<&str>) -> Result<GraphSchema> {
        self.schema.discover_schema(ctx, tenant).await
    }
}
