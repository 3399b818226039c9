//! Entity and relationship repository.
//!
//! [`GraphStore`] layers graph records on top of an [`ObjectStore`]: it
//! validates input, stamps tenant and timestamps, generates embeddings and
//! batches writes. Backend objects are addressed by an [`ObjectHandle`] that is
//! only learned by querying, so every mutation first resolves the handle from
//! the domain `id` and tenant.

pub(crate) mod codec;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::{resolve_tenant, RequestContext};
use crate::driver::{Filter, GroupCount, ObjectHandle, ObjectStore, StoredObject};
use crate::edges::{Direction, Relationship};
use crate::embedder::EmbedderClient;
use crate::errors::{GraphError, Result};
use crate::nodes::Entity;
use crate::types::GraphConfig;

use codec::{
    entity_from_object, entity_to_object, relationship_from_object, relationship_to_object,
    FIELD_ENTITY_TYPE, FIELD_ID, FIELD_RELATIONSHIP_TYPE, FIELD_SOURCE_ID, FIELD_TARGET_ID,
    FIELD_TENANT,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for [`GraphStore::store_entities`], [`GraphStore::store_relationships`]
/// and [`GraphStore::update_entity`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Overrides the context and configured tenant.
    pub tenant: Option<String>,
    /// Overrides [`GraphConfig::auto_embed`].
    pub generate_embeddings: Option<bool>,
    /// Overrides [`GraphConfig::batch_size`]; `Some(0)` falls back to the config.
    pub batch_size: Option<usize>,
}

impl StoreOptions {
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_embeddings(mut self, enabled: bool) -> Self {
        self.generate_embeddings = Some(enabled);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Options for single-record reads and deletes.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub tenant: Option<String>,
}

impl ReadOptions {
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Options for [`GraphStore::get_relationships`].
#[derive(Debug, Clone, Default)]
pub struct RelationshipOptions {
    pub tenant: Option<String>,
    /// Allow-list of relationship types; empty means every type.
    pub relationship_types: Vec<String>,
}

impl RelationshipOptions {
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_relationship_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationship_types = types.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// BatchReport
// ---------------------------------------------------------------------------

/// One object the backend refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a batch write.
///
/// Per-object backend errors do not fail the call; they are collected here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub stored: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.stored == self.attempted
    }

    fn record(&mut self, id: &str, outcome: std::result::Result<ObjectHandle, String>) {
        match outcome {
            Ok(_) => self.stored += 1,
            Err(reason) => self.failures.push(ItemFailure { id: id.to_string(), reason }),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

/// Repository for entities and relationships.
///
/// Cheap to clone; holds no per-caller state. The tenant is resolved per call
/// from the options, the [`RequestContext`] and the configured default.
#[derive(Clone)]
pub struct GraphStore {
    backend: Arc<dyn ObjectStore>,
    embedder: Option<Arc<dyn EmbedderClient>>,
    config: Arc<GraphConfig>,
    entity_collection: Arc<str>,
    relationship_collection: Arc<str>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("entity_collection", &self.entity_collection)
            .field("relationship_collection", &self.relationship_collection)
            .field("has_embedder", &self.embedder.is_some())
            .finish()
    }
}

impl GraphStore {
    pub fn new(
        backend: Arc<dyn ObjectStore>,
        embedder: Option<Arc<dyn EmbedderClient>>,
        config: GraphConfig,
    ) -> Self {
        Self {
            entity_collection: config.entity_collection().into(),
            relationship_collection: config.relationship_collection().into(),
            backend,
            embedder,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn embedder(&self) -> Option<&Arc<dyn EmbedderClient>> {
        self.embedder.as_ref()
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.backend
    }

    pub(crate) fn entity_collection(&self) -> &str {
        &self.entity_collection
    }

    pub(crate) fn resolve_tenant(&self, explicit: Option<&str>, ctx: &RequestContext) -> Option<String> {
        resolve_tenant(explicit, ctx, self.config.default_tenant.as_deref())
    }

    fn batch_size(&self, opts: &StoreOptions) -> usize {
        opts.batch_size
            .filter(|n| *n > 0)
            .unwrap_or(self.config.batch_size)
            .max(1)
    }

    fn embeddings_enabled(&self, opts: &StoreOptions) -> bool {
        self.embedder.is_some() && opts.generate_embeddings.unwrap_or(self.config.auto_embed)
    }

    // -- entities -----------------------------------------------------------

    /// Persist entities in batches.
    ///
    /// Every entity is validated before anything is written. Entities without
    /// an embedding get one from their description (or name) when embedding is
    /// enabled and an embedder is configured.
    pub async fn store_entities(
        &self,
        ctx: &RequestContext,
        mut entities: Vec<Entity>,
        opts: &StoreOptions,
    ) -> Result<BatchReport> {
        if entities.is_empty() {
            return Ok(BatchReport::default());
        }
        for entity in &entities {
            entity.validate()?;
        }

        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        if self.embeddings_enabled(opts) {
            self.embed_missing(ctx, &mut entities).await?;
        }

        let now = Utc::now();
        for entity in &mut entities {
            if tenant.is_some() {
                entity.tenant = tenant.clone();
            }
            entity.created_at.get_or_insert(now);
            entity.updated_at.get_or_insert(now);
        }

        let batch_size = self.batch_size(opts);
        let mut report = BatchReport::default();
        for chunk in entities.chunks(batch_size) {
            let objects = chunk.iter().map(entity_to_object).collect::<Result<Vec<_>>>()?;
            let outcomes = ctx
                .run(self.backend.insert_batch(&self.entity_collection, objects))
                .await?;
            self.collect_outcomes(&mut report, chunk.iter().map(|e| e.id.as_str()), outcomes);
        }

        info!(
            collection = %self.entity_collection,
            attempted = report.attempted,
            stored = report.stored,
            failed = report.failures.len(),
            "stored entities"
        );
        Ok(report)
    }

    async fn embed_missing(&self, ctx: &RequestContext, entities: &mut [Entity]) -> Result<()> {
        let Some(embedder) = &self.embedder else {
            return Ok(());
        };
        let pending: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = pending.iter().map(|&i| entities[i].embedding_text()).collect();
        let vectors = ctx.run(embedder.embed_batch(&texts)).await?;
        if vectors.len() != pending.len() {
            return Err(GraphError::Embedder(format!(
                "expected {} embeddings, got {}",
                pending.len(),
                vectors.len()
            )));
        }
        for (i, vector) in pending.into_iter().zip(vectors) {
            entities[i].embedding = Some(vector);
        }
        Ok(())
    }

    fn collect_outcomes<'a>(
        &self,
        report: &mut BatchReport,
        ids: impl Iterator<Item = &'a str>,
        outcomes: Vec<std::result::Result<ObjectHandle, String>>,
    ) {
        let mut outcomes = outcomes.into_iter();
        for id in ids {
            report.attempted += 1;
            let outcome = outcomes
                .next()
                .unwrap_or_else(|| Err("backend returned no result for object".to_string()));
            if let Err(reason) = &outcome {
                warn!(id, %reason, "backend rejected object");
            }
            report.record(id, outcome);
        }
    }

    /// Fetch one entity by id within the resolved tenant.
    pub async fn get_entity(&self, ctx: &RequestContext, id: &str, opts: &ReadOptions) -> Result<Entity> {
        require_id(id)?;
        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        match self.fetch_one(ctx, &self.entity_collection, id, tenant.as_deref()).await? {
            Some(object) => entity_from_object(object),
            None => {
                debug!(id, tenant = tenant.as_deref().unwrap_or(""), "entity not found");
                Err(GraphError::EntityNotFound(id.to_string()))
            }
        }
    }

    /// Overwrite a stored entity.
    ///
    /// The stored record must exist in the resolved tenant. `created_at` is
    /// kept from the stored record when the caller leaves it unset, as is the
    /// stored vector when no new embedding is produced. `updated_at` is
    /// always set to now.
    pub async fn update_entity(
        &self,
        ctx: &RequestContext,
        mut entity: Entity,
        opts: &StoreOptions,
    ) -> Result<Entity> {
        entity.validate()?;
        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        let existing = self
            .fetch_one(ctx, &self.entity_collection, &entity.id, tenant.as_deref())
            .await?
            .ok_or_else(|| GraphError::EntityNotFound(entity.id.clone()))?;
        let handle = existing.handle;
        let stored = entity_from_object(existing)?;

        if self.embeddings_enabled(opts) {
            if let Some(embedder) = &self.embedder {
                let vector = ctx.run(embedder.embed(entity.embedding_text())).await?;
                entity.embedding = Some(vector);
            }
        }
        entity.embedding = entity.embedding.or(stored.embedding);
        entity.tenant = tenant.or(stored.tenant);
        entity.created_at = entity.created_at.or(stored.created_at);
        entity.updated_at = Some(Utc::now());

        let object = entity_to_object(&entity)?;
        ctx.run(self.backend.update(&self.entity_collection, handle, object))
            .await?;
        debug!(id = %entity.id, "updated entity");
        Ok(entity)
    }

    pub async fn delete_entity(&self, ctx: &RequestContext, id: &str, opts: &ReadOptions) -> Result<()> {
        require_id(id)?;
        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        let handle = self
            .resolve_handle(ctx, &self.entity_collection, id, tenant.as_deref())
            .await?
            .ok_or_else(|| GraphError::EntityNotFound(id.to_string()))?;
        ctx.run(self.backend.delete(&self.entity_collection, handle)).await?;
        debug!(id, "deleted entity");
        Ok(())
    }

    // -- relationships ------------------------------------------------------

    /// Persist relationships in batches.
    ///
    /// Types are normalised to upper snake case and a zero strength becomes
    /// the default before validation. Endpoint existence is not checked.
    pub async fn store_relationships(
        &self,
        ctx: &RequestContext,
        mut relationships: Vec<Relationship>,
        opts: &StoreOptions,
    ) -> Result<BatchReport> {
        if relationships.is_empty() {
            return Ok(BatchReport::default());
        }
        for rel in &mut relationships {
            rel.normalize();
            rel.validate()?;
        }

        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        let now = Utc::now();
        for rel in &mut relationships {
            if tenant.is_some() {
                rel.tenant = tenant.clone();
            }
            rel.created_at.get_or_insert(now);
        }

        let batch_size = self.batch_size(opts);
        let mut report = BatchReport::default();
        for chunk in relationships.chunks(batch_size) {
            let objects = chunk
                .iter()
                .map(relationship_to_object)
                .collect::<Result<Vec<_>>>()?;
            let outcomes = ctx
                .run(self.backend.insert_batch(&self.relationship_collection, objects))
                .await?;
            self.collect_outcomes(&mut report, chunk.iter().map(|r| r.id.as_str()), outcomes);
        }

        info!(
            collection = %self.relationship_collection,
            attempted = report.attempted,
            stored = report.stored,
            failed = report.failures.len(),
            "stored relationships"
        );
        Ok(report)
    }

    /// Relationships touching `entity_id` in the given direction.
    ///
    /// `Both` returns the union of both directions without duplicates.
    pub async fn get_relationships(
        &self,
        ctx: &RequestContext,
        entity_id: &str,
        direction: Direction,
        opts: &RelationshipOptions,
    ) -> Result<Vec<Relationship>> {
        require_id(entity_id)?;
        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);

        let endpoint = match direction {
            Direction::Outgoing => Filter::eq(FIELD_SOURCE_ID, entity_id),
            Direction::Incoming => Filter::eq(FIELD_TARGET_ID, entity_id),
            Direction::Both => Filter::Or(vec![
                Filter::eq(FIELD_SOURCE_ID, entity_id),
                Filter::eq(FIELD_TARGET_ID, entity_id),
            ]),
        };
        let mut clauses = vec![endpoint];
        if let Some(tenant) = &tenant {
            clauses.push(Filter::eq(FIELD_TENANT, tenant.as_str()));
        }
        if let Some(types) = Filter::any(
            opts.relationship_types
                .iter()
                .map(|t| Filter::eq(FIELD_RELATIONSHIP_TYPE, crate::utils::to_upper_snake_case(t)))
                .collect(),
        ) {
            clauses.push(types);
        }
        let filter = Filter::all(clauses);

        let objects = ctx
            .run(self.backend.fetch(&self.relationship_collection, filter.as_ref(), None))
            .await?;

        let mut seen = HashSet::new();
        let mut relationships = Vec::with_capacity(objects.len());
        for object in objects {
            let rel = relationship_from_object(object)?;
            if seen.insert(rel.id.clone()) {
                relationships.push(rel);
            }
        }
        debug!(entity_id, %direction, count = relationships.len(), "fetched relationships");
        Ok(relationships)
    }

    /// Fetch one relationship by id within the resolved tenant.
    pub async fn get_relationship(
        &self,
        ctx: &RequestContext,
        id: &str,
        opts: &ReadOptions,
    ) -> Result<Relationship> {
        require_id(id)?;
        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        self.fetch_one(ctx, &self.relationship_collection, id, tenant.as_deref())
            .await?
            .ok_or_else(|| GraphError::RelationshipNotFound(id.to_string()))
            .and_then(relationship_from_object)
    }

    pub async fn delete_relationship(
        &self,
        ctx: &RequestContext,
        id: &str,
        opts: &ReadOptions,
    ) -> Result<()> {
        require_id(id)?;
        let tenant = self.resolve_tenant(opts.tenant.as_deref(), ctx);
        let handle = self
            .resolve_handle(ctx, &self.relationship_collection, id, tenant.as_deref())
            .await?
            .ok_or_else(|| GraphError::RelationshipNotFound(id.to_string()))?;
        ctx.run(self.backend.delete(&self.relationship_collection, handle))
            .await?;
        debug!(id, "deleted relationship");
        Ok(())
    }

    // -- aggregation --------------------------------------------------------

    /// Entity counts per type within the resolved tenant, most frequent first.
    pub async fn entity_type_counts(
        &self,
        ctx: &RequestContext,
        tenant: Option<&str>,
    ) -> Result<Vec<GroupCount>> {
        let tenant = self.resolve_tenant(tenant, ctx);
        let filter = tenant_filter(tenant.as_deref());
        ctx.run(self.backend.aggregate_group_by(
            &self.entity_collection,
            FIELD_ENTITY_TYPE,
            filter.as_ref(),
        ))
        .await
    }

    /// Relationship counts per type within the resolved tenant, most frequent first.
    pub async fn relationship_type_counts(
        &self,
        ctx: &RequestContext,
        tenant: Option<&str>,
    ) -> Result<Vec<GroupCount>> {
        let tenant = self.resolve_tenant(tenant, ctx);
        let filter = tenant_filter(tenant.as_deref());
        ctx.run(self.backend.aggregate_group_by(
            &self.relationship_collection,
            FIELD_RELATIONSHIP_TYPE,
            filter.as_ref(),
        ))
        .await
    }

    // -- handle resolution --------------------------------------------------

    /// Backend handle of the object with domain `id` in `tenant`, if any.
    pub(crate) async fn resolve_handle(
        &self,
        ctx: &RequestContext,
        collection: &str,
        id: &str,
        tenant: Option<&str>,
    ) -> Result<Option<ObjectHandle>> {
        Ok(self
            .fetch_one(ctx, collection, id, tenant)
            .await?
            .map(|object| object.handle))
    }

    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        collection: &str,
        id: &str,
        tenant: Option<&str>,
    ) -> Result<Option<StoredObject>> {
        let mut clauses = vec![Filter::eq(FIELD_ID, id)];
        if let Some(tenant) = tenant {
            clauses.push(Filter::eq(FIELD_TENANT, tenant));
        }
        let filter = Filter::all(clauses);
        let objects = ctx
            .run(self.backend.fetch(collection, filter.as_ref(), Some(1)))
            .await?;
        Ok(objects.into_iter().next())
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(
        &self,
        collection: &str,
        objects: Vec<crate::driver::NewObject>,
    ) -> Result<()> {
        self.backend.insert_batch(collection, objects).await.map(|_| ())
    }
}

/// Tenant filter, or `None` for unscoped queries.
pub(crate) fn tenant_filter(tenant: Option<&str>) -> Option<Filter> {
    tenant.map(|t| Filter::eq(FIELD_TENANT, t))
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(GraphError::InvalidId("id must not be empty".to_string()));
    }
    Ok(())
}
