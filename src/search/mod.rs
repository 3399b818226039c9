//! Search subsystem.
//!
//! Three retrieval modes over the entity collection:
//! - **Vector**: nearest neighbours of the query embedding, scored by certainty
//! - **Keyword**: BM25 over name, description and type
//! - **Hybrid**: weighted blend of both, degrading to keyword when no
//!   embedding is available
//!
//! On top of these, [`SearchEngine::local_search`] attaches a traversal
//! context and [`SearchEngine::global_search`] searches each entity-type
//! partition separately.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::driver::{Filter, StoredObject};
use crate::errors::{GraphError, Result};
use crate::nodes::Entity;
use crate::store::codec::{entity_from_object, ENTITY_TEXT_FIELDS, FIELD_ENTITY_TYPE};
use crate::store::{tenant_filter, GraphStore};
use crate::traversal::{effective_depth, GraphContext, TraversalEngine, TraversalOptions};

/// Result count when the caller passes `0`.
pub const DEFAULT_LIMIT: usize = 10;
/// Results kept per partition in [`SearchEngine::global_search`].
pub const COMMUNITY_RESULT_CAP: usize = 5;
/// Vector weight of the hybrid blend.
pub const DEFAULT_ALPHA: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Keyword,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Vector => "vector",
            SearchMode::Keyword => "keyword",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" => Ok(SearchMode::Vector),
            "keyword" | "bm25" => Ok(SearchMode::Keyword),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(GraphError::InvalidArgument(format!("unknown search mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub mode: SearchMode,
    /// Results scoring below this are dropped.
    pub min_score: f32,
    /// Entity-type allow-list; empty allows every type.
    pub entity_types: Vec<String>,
    pub tenant: Option<String>,
    /// Hybrid vector weight; `None` means [`DEFAULT_ALPHA`].
    pub alpha: Option<f32>,
}

impl SearchOptions {
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub entity: Entity,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<GraphContext>,
    /// Entity-type partition the result came from (global search only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
}

/// Squash a raw BM25 score into `[0, 1)`.
pub fn normalize_keyword_score(score: f32) -> f32 {
    let score = score.max(0.0);
    score / (score + 1.0)
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    store: GraphStore,
    traversal: TraversalEngine,
}

impl SearchEngine {
    pub fn new(store: GraphStore) -> Self {
        Self { traversal: TraversalEngine::new(store.clone()), store }
    }

    /// Ranked entities matching `query`.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        limit: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(GraphError::InvalidArgument("search query must not be empty".to_string()));
        }
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
        let filter = self.build_filter(ctx, opts);

        let scored = match opts.mode {
            SearchMode::Vector => self.vector(ctx, query, filter.as_ref(), limit).await?,
            SearchMode::Keyword => self.keyword(ctx, query, filter.as_ref(), limit).await?,
            SearchMode::Hybrid => self.hybrid(ctx, query, filter.as_ref(), limit, opts).await?,
        };

        let results = self.decode(scored, opts.min_score);
        debug!(mode = %opts.mode, query, results = results.len(), "search complete");
        Ok(results)
    }

    fn build_filter(&self, ctx: &RequestContext, opts: &SearchOptions) -> Option<Filter> {
        let tenant = self.store.resolve_tenant(opts.tenant.as_deref(), ctx);
        let mut clauses: Vec<Filter> = tenant_filter(tenant.as_deref()).into_iter().collect();
        if let Some(types) = Filter::any(
            opts.entity_types
                .iter()
                .map(|t| Filter::eq(FIELD_ENTITY_TYPE, t.as_str()))
                .collect(),
        ) {
            clauses.push(types);
        }
        Filter::all(clauses)
    }

    async fn vector(
        &self,
        ctx: &RequestContext,
        query: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<(StoredObject, f32)>> {
        let embedder = self.store.embedder().ok_or(GraphError::NoEmbedder)?;
        let vector = ctx.run(embedder.embed(query)).await?;
        let objects = ctx
            .run(self.store.backend().near_vector(
                self.store.entity_collection(),
                &vector,
                filter,
                limit,
            ))
            .await?;
        Ok(objects
            .into_iter()
            .map(|o| {
                let score = o.score.unwrap_or(0.0);
                (o, score)
            })
            .collect())
    }

    async fn keyword(
        &self,
        ctx: &RequestContext,
        query: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<(StoredObject, f32)>> {
        let objects = ctx
            .run(self.store.backend().bm25(
                self.store.entity_collection(),
                query,
                ENTITY_TEXT_FIELDS,
                filter,
                limit,
            ))
            .await?;
        Ok(objects
            .into_iter()
            .map(|o| {
                let score = normalize_keyword_score(o.score.unwrap_or(0.0));
                (o, score)
            })
            .collect())
    }

    async fn hybrid(
        &self,
        ctx: &RequestContext,
        query: &str,
        filter: Option<&Filter>,
        limit: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<(StoredObject, f32)>> {
        let Some(embedder) = self.store.embedder() else {
            debug!("no embedder configured, hybrid search falls back to keyword");
            return self.keyword(ctx, query, filter, limit).await;
        };
        let vector = match ctx.run(embedder.embed(query)).await {
            Ok(vector) => vector,
            Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
            Err(e) => {
                warn!(error = %e, "query embedding failed, hybrid search falls back to keyword");
                return self.keyword(ctx, query, filter, limit).await;
            }
        };

        let alpha = opts.alpha.unwrap_or(DEFAULT_ALPHA).clamp(0.0, 1.0);
        let objects = ctx
            .run(self.store.backend().hybrid(
                self.store.entity_collection(),
                query,
                &vector,
                alpha,
                ENTITY_TEXT_FIELDS,
                filter,
                limit,
            ))
            .await?;
        Ok(objects
            .into_iter()
            .map(|o| {
                let score = o.score.unwrap_or(0.0);
                (o, score)
            })
            .collect())
    }

    fn decode(&self, scored: Vec<(StoredObject, f32)>, min_score: f32) -> Vec<SearchResult> {
        scored
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .filter_map(|(object, score)| {
                let handle = object.handle;
                match entity_from_object(object) {
                    Ok(entity) => Some(SearchResult { entity, score, context: None, community_id: None }),
                    Err(e) => {
                        warn!(%handle, error = %e, "skipping undecodable search hit");
                        None
                    }
                }
            })
            .collect()
    }

    /// Search, then expand a graph context around `entity_id` or the top hit.
    ///
    /// The context lands on the result whose entity is the seed, or on the
    /// top result when the seed is not among the hits. A seed that no longer
    /// exists leaves the results without context.
    pub async fn local_search(
        &self,
        ctx: &RequestContext,
        query: &str,
        entity_id: Option<&str>,
        depth: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        effective_depth(depth)?;
        let mut results = self.search(ctx, query, 0, opts).await?;

        let seed = match entity_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id.to_string(),
            None => match results.first() {
                Some(top) => top.entity.id.clone(),
                None => return Ok(results),
            },
        };
        if results.is_empty() {
            return Ok(results);
        }

        let traversal_opts = TraversalOptions {
            tenant: opts.tenant.clone(),
            relationship_types: Vec::new(),
        };
        let context = match self.traversal.traverse_from(ctx, &seed, depth, &traversal_opts).await {
            Ok(context) => context,
            Err(e) if e.is_not_found() => {
                warn!(seed = %seed, error = %e, "local search seed not found, returning plain results");
                return Ok(results);
            }
            Err(e) => return Err(e),
        };

        let slot = results.iter().position(|r| r.entity.id == seed).unwrap_or(0);
        results[slot].context = Some(context);
        Ok(results)
    }

    /// Search every entity-type partition and merge the results.
    ///
    /// Partitions come from a grouped count over entity types, restricted to
    /// `opts.entity_types` when given. If discovery fails or finds nothing,
    /// this degrades to a plain [`search`](Self::search).
    ///
    /// Partitions are flat, so every `community_level` yields the same split.
    pub async fn global_search(
        &self,
        ctx: &RequestContext,
        query: &str,
        community_level: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(GraphError::InvalidArgument("search query must not be empty".to_string()));
        }

        let communities: Vec<String> = match self.store.entity_type_counts(ctx, opts.tenant.as_deref()).await {
            Ok(groups) => groups
                .into_iter()
                .map(|g| g.value)
                .filter(|t| opts.entity_types.is_empty() || opts.entity_types.contains(t))
                .collect(),
            Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
            Err(e) => {
                warn!(error = %e, "community discovery failed, falling back to plain search");
                return self.search(ctx, query, 0, opts).await;
            }
        };
        if communities.is_empty() {
            debug!("no communities discovered, falling back to plain search");
            return self.search(ctx, query, 0, opts).await;
        }

        let mut merged = Vec::new();
        for community in communities {
            let partition = SearchOptions {
                entity_types: vec![community.clone()],
                ..opts.clone()
            };
            let hits = self.search(ctx, query, COMMUNITY_RESULT_CAP, &partition).await?;
            merged.extend(hits.into_iter().map(|mut hit| {
                hit.community_id = Some(community.clone());
                hit
            }));
        }
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!(community_level, results = merged.len(), "global search complete");
        Ok(merged)
    }
}
