//! Entity: a node of the knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{GraphError, Result};

/// A real-world entity (person, organisation, concept) stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Domain identifier, unique within a tenant. Not the backend's handle.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    /// Free-form attributes; insertion order is preserved.
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Owning tenant (organisation id). Filled in by the store on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            description: String::new(),
            properties: Map::new(),
            embedding: None,
            tenant: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Check the fields every persisted entity must carry.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GraphError::InvalidId("entity id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(GraphError::MissingRequiredField { field: "name" });
        }
        if self.entity_type.trim().is_empty() {
            return Err(GraphError::MissingRequiredField { field: "type" });
        }
        Ok(())
    }

    /// Text used to embed this entity: the description, or the name when empty.
    pub fn embedding_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}
