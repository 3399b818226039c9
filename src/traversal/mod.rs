//! Graph traversal over a backend without native graph queries.
//!
//! Both operations expand breadth-first, one round-trip per node and
//! direction, using [`GraphStore`] lookups for every hop.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::edges::{Direction, Relationship};
use crate::errors::{GraphError, Result};
use crate::nodes::Entity;
use crate::store::{GraphStore, ReadOptions, RelationshipOptions};

/// Deepest supported context expansion.
pub const MAX_DEPTH: usize = 5;
/// Depth used when a caller passes `0`.
pub const DEFAULT_DEPTH: usize = 2;
/// Hop limit for [`TraversalEngine::shortest_path`] when unset.
pub const DEFAULT_PATH_DEPTH: usize = 5;

/// Neighbourhood of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphContext {
    pub central_entity: Entity,
    pub depth: usize,
    /// Every visited entity, the central one first.
    pub entities: Vec<Entity>,
    /// Relationships seen during expansion, unique by id.
    pub relationships: Vec<Relationship>,
}

impl GraphContext {
    pub fn contains_entity(&self, id: &str) -> bool {
        self.entities.iter().any(|e| e.id == id)
    }
}

/// A path between two entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPath {
    pub source: Entity,
    pub target: Entity,
    /// Intermediate entities in path order; excludes source and target.
    pub entities: Vec<Entity>,
    /// Relationships in path order.
    pub relationships: Vec<Relationship>,
    /// Number of hops.
    pub length: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    pub tenant: Option<String>,
    /// Only follow these relationship types; empty follows all.
    pub relationship_types: Vec<String>,
}

impl TraversalOptions {
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

#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub tenant: Option<String>,
    /// Maximum hops; `0` means [`DEFAULT_PATH_DEPTH`].
    pub max_depth: usize,
}

impl PathOptions {
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Normalise a requested depth: `0` becomes the default, above [`MAX_DEPTH`] fails.
pub fn effective_depth(depth: usize) -> Result<usize> {
    match depth {
        0 => Ok(DEFAULT_DEPTH),
        d if d > MAX_DEPTH => Err(GraphError::MaxDepthExceeded { depth: d, max: MAX_DEPTH }),
        d => Ok(d),
    }
}

#[derive(Debug, Clone)]
pub struct TraversalEngine {
    store: GraphStore,
}

/// BFS queue entry: the node, plus the ids and relationships that led to it.
struct Trail {
    node: String,
    path: Vec<String>,
    relationships: Vec<Relationship>,
}

impl TraversalEngine {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    /// Breadth-first context expansion from `entity_id`.
    ///
    /// Level 0 is the seed. Relationships are fetched for levels below
    /// `depth`, so the outermost level contributes entities only. Entities
    /// that no longer exist are skipped; a missing seed is
    /// [`GraphError::EntityNotFound`].
    pub async fn traverse_from(
        &self,
        ctx: &RequestContext,
        entity_id: &str,
        depth: usize,
        opts: &TraversalOptions,
    ) -> Result<GraphContext> {
        let depth = effective_depth(depth)?;
        if entity_id.trim().is_empty() {
            return Err(GraphError::InvalidId("entity id must not be empty".to_string()));
        }

        let tenant = self.store.resolve_tenant(opts.tenant.as_deref(), ctx);
        let read_opts = ReadOptions { tenant: tenant.clone() };
        let rel_opts = RelationshipOptions {
            tenant,
            relationship_types: opts.relationship_types.clone(),
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_relationships: HashSet<String> = HashSet::new();
        let mut entities: Vec<Entity> = Vec::new();
        let mut relationships: Vec<Relationship> = Vec::new();
        let mut frontier = vec![entity_id.to_string()];

        for level in 0..=depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();

            for id in frontier {
                if visited.contains(&id) {
                    continue;
                }
                let entity = match self.store.get_entity(ctx, &id, &read_opts).await {
                    Ok(entity) => entity,
                    Err(e) if e.is_not_found() => {
                        debug!(id = %id, level, "skipping missing entity during traversal");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                visited.insert(id.clone());
                entities.push(entity);

                if level == depth {
                    continue;
                }
                for direction in [Direction::Outgoing, Direction::Incoming] {
                    let edges = self
                        .store
                        .get_relationships(ctx, &id, direction, &rel_opts)
                        .await?;
                    for rel in edges {
                        if let Some(other) = rel.other_end(&id) {
                            if !visited.contains(other) {
                                next.push(other.to_string());
                            }
                        }
                        if seen_relationships.insert(rel.id.clone()) {
                            relationships.push(rel);
                        }
                    }
                }
            }
            frontier = next;
        }

        if entities.is_empty() {
            return Err(GraphError::EntityNotFound(entity_id.to_string()));
        }
        debug!(
            entity_id,
            depth,
            entities = entities.len(),
            relationships = relationships.len(),
            "traversal complete"
        );
        Ok(GraphContext {
            central_entity: entities[0].clone(),
            depth,
            entities,
            relationships,
        })
    }

    /// Fewest-hop path between two entities, ignoring relationship direction.
    pub async fn shortest_path(
        &self,
        ctx: &RequestContext,
        source_id: &str,
        target_id: &str,
        opts: &PathOptions,
    ) -> Result<GraphPath> {
        if source_id.trim().is_empty() || target_id.trim().is_empty() {
            return Err(GraphError::InvalidId("path endpoints must not be empty".to_string()));
        }
        let max_depth = if opts.max_depth == 0 { DEFAULT_PATH_DEPTH } else { opts.max_depth };
        let tenant = self.store.resolve_tenant(opts.tenant.as_deref(), ctx);
        let read_opts = ReadOptions { tenant: tenant.clone() };
        let rel_opts = RelationshipOptions { tenant, relationship_types: Vec::new() };

        if source_id == target_id {
            let entity = self.store.get_entity(ctx, source_id, &read_opts).await?;
            return Ok(GraphPath {
                source: entity.clone(),
                target: entity,
                entities: Vec::new(),
                relationships: Vec::new(),
                length: 0,
            });
        }

        let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);
        let mut queue = VecDeque::from([Trail {
            node: source_id.to_string(),
            path: vec![source_id.to_string()],
            relationships: Vec::new(),
        }]);

        while let Some(trail) = queue.pop_front() {
            if trail.node == target_id {
                return self.materialize(ctx, trail, &read_opts).await;
            }
            if trail.relationships.len() >= max_depth {
                continue;
            }
            let edges = self
                .store
                .get_relationships(ctx, &trail.node, Direction::Both, &rel_opts)
                .await?;
            for rel in edges {
                let Some(next) = rel.other_end(&trail.node) else {
                    continue;
                };
                if !visited.insert(next.to_string()) {
                    continue;
                }
                let mut path = trail.path.clone();
                path.push(next.to_string());
                let mut relationships = trail.relationships.clone();
                let node = next.to_string();
                relationships.push(rel);
                queue.push_back(Trail { node, path, relationships });
            }
        }

        Err(GraphError::PathNotFound {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
        })
    }

    async fn materialize(
        &self,
        ctx: &RequestContext,
        trail: Trail,
        read_opts: &ReadOptions,
    ) -> Result<GraphPath> {
        let Trail { path, relationships, .. } = trail;
        let (first, last) = match (path.first(), path.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(GraphError::InvalidArgument("empty path".to_string())),
        };
        let source = self.store.get_entity(ctx, first, read_opts).await?;
        let target = self.store.get_entity(ctx, last, read_opts).await?;

        let mut entities = Vec::with_capacity(path.len().saturating_sub(2));
        for id in &path[1..path.len() - 1] {
            match self.store.get_entity(ctx, id, read_opts).await {
                Ok(entity) => entities.push(entity),
                Err(e) if e.is_not_found() => {
                    warn!(id = %id, "intermediate path entity disappeared");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(GraphPath {
            length: relationships.len(),
            source,
            target,
            entities,
            relationships,
        })
    }
}
