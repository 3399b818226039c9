//! Graph schema: permitted entity and relationship types.
//!
//! A schema is either applied explicitly or discovered from what is already
//! stored. Extraction uses it to constrain prompts and filter results.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::errors::{GraphError, Result};
use crate::store::GraphStore;
use crate::utils::to_upper_snake_case;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl EntityTypeDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTypeDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Allowed source entity types; empty allows any.
    #[serde(default)]
    pub source_types: Vec<String>,
    /// Allowed target entity types; empty allows any.
    #[serde(default)]
    pub target_types: Vec<String>,
}

impl RelationshipTypeDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source_types: Vec::new(),
            target_types: Vec::new(),
        }
    }

    pub fn between<S, T>(mut self, sources: S, targets: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        self.source_types = sources.into_iter().map(Into::into).collect();
        self.target_types = targets.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSchema {
    #[serde(default)]
    pub entity_types: Vec<EntityTypeDef>,
    #[serde(default)]
    pub relationship_types: Vec<RelationshipTypeDef>,
}

impl GraphSchema {
    pub fn is_empty(&self) -> bool {
        self.entity_types.is_empty() && self.relationship_types.is_empty()
    }

    /// Case-insensitive membership; a schema without entity types allows all.
    pub fn allows_entity_type(&self, entity_type: &str) -> bool {
        self.entity_types.is_empty()
            || self
                .entity_types
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(entity_type))
    }

    /// Whether `relationship_type` may connect `source_type` to `target_type`.
    pub fn allows_relationship(
        &self,
        relationship_type: &str,
        source_type: &str,
        target_type: &str,
    ) -> bool {
        if self.relationship_types.is_empty() {
            return true;
        }
        let wanted = to_upper_snake_case(relationship_type);
        self.relationship_types.iter().any(|def| {
            to_upper_snake_case(&def.name) == wanted
                && type_allowed(&def.source_types, source_type)
                && type_allowed(&def.target_types, target_type)
        })
    }

    pub fn entity_type_names(&self) -> Vec<String> {
        self.entity_types.iter().map(|t| t.name.clone()).collect()
    }

    pub fn relationship_type_names(&self) -> Vec<String> {
        self.relationship_types.iter().map(|t| t.name.clone()).collect()
    }

    /// Parse a schema from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(GraphError::from)
    }
}

fn type_allowed(allowed: &[String], actual: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|t| t.eq_ignore_ascii_case(actual))
}

/// Holds the applied schema and infers one from stored data when none is set.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    store: GraphStore,
    applied: Arc<RwLock<Option<GraphSchema>>>,
}

impl SchemaManager {
    pub fn new(store: GraphStore) -> Self {
        Self { store, applied: Arc::new(RwLock::new(None)) }
    }

    /// Cache `schema`; later discovery returns it verbatim.
    pub fn apply_schema(&self, schema: GraphSchema) {
        debug!(
            entity_types = schema.entity_types.len(),
            relationship_types = schema.relationship_types.len(),
            "schema applied"
        );
        *self.applied.write() = Some(schema);
    }

    pub fn applied_schema(&self) -> Option<GraphSchema> {
        self.applied.read().clone()
    }

    pub fn clear_schema(&self) {
        *self.applied.write() = None;
    }

    /// The applied schema, or one inferred from stored type counts.
    ///
    /// Aggregation failures are logged and leave the affected half empty.
    /// Only cancellation is returned as an error.
    pub async fn discover_schema(
        &self,
        ctx: &RequestContext,
        tenant: Option<&str>,
    ) -> Result<GraphSchema> {
        if let Some(schema) = self.applied_schema() {
            return Ok(schema);
        }

        let mut schema = GraphSchema::default();

        match self.store.entity_type_counts(ctx, tenant).await {
            Ok(groups) => {
                schema.entity_types = groups
                    .into_iter()
                    .map(|g| {
                        let description = format!("Discovered entity type: {}", g.value);
                        EntityTypeDef::new(g.value, description)
                    })
                    .collect();
            }
            Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
            Err(e) => warn!(error = %e, "entity type discovery failed"),
        }

        match self.store.relationship_type_counts(ctx, tenant).await {
            Ok(groups) => {
                schema.relationship_types = groups
                    .into_iter()
                    .map(|g| {
                        let description = format!("Discovered relationship type: {}", g.value);
                        RelationshipTypeDef::new(g.value, description)
                    })
                    .collect();
            }
            Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
            Err(e) => warn!(error = %e, "relationship type discovery failed"),
        }

        debug!(
            entity_types = schema.entity_types.len(),
            relationship_types = schema.relationship_types.len(),
            "schema discovered"
        );
        Ok(schema)
    }
}
