//! Relationship: a typed, directed edge between two entities.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{GraphError, Result};
use crate::utils::to_upper_snake_case;

/// Strength assigned when none (or zero) is given.
pub const DEFAULT_STRENGTH: f32 = 1.0;

/// A directed relationship `source_id -[relationship_type]-> target_id`.
///
/// Relationships are immutable once stored; delete and recreate to change one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Upper snake case label, e.g. `"WORKS_ON"`.
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub description: String,
    /// Weight in `[0.0, 1.0]`; `0.0` means "unset" and is stored as [`DEFAULT_STRENGTH`].
    #[serde(default)]
    pub strength: f32,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Relationship {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
            description: String::new(),
            strength: DEFAULT_STRENGTH,
            properties: Map::new(),
            tenant: None,
            created_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
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

    /// Check required fields and the strength range. Out-of-range strength is rejected.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GraphError::InvalidId("relationship id must not be empty".to_string()));
        }
        if self.source_id.trim().is_empty() {
            return Err(GraphError::MissingRequiredField { field: "source_id" });
        }
        if self.target_id.trim().is_empty() {
            return Err(GraphError::MissingRequiredField { field: "target_id" });
        }
        if to_upper_snake_case(&self.relationship_type).is_empty() {
            return Err(GraphError::MissingRequiredField { field: "type" });
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(GraphError::InvalidStrength {
                id: self.id.clone(),
                strength: self.strength,
            });
        }
        Ok(())
    }

    /// Upper-snake the type and replace an unset strength with the default.
    pub fn normalize(&mut self) {
        self.relationship_type = to_upper_snake_case(&self.relationship_type);
        if self.strength == 0.0 {
            self.strength = DEFAULT_STRENGTH;
        }
    }

    /// The endpoint opposite `entity_id`, or `None` if the edge does not touch it.
    pub fn other_end(&self, entity_id: &str) -> Option<&str> {
        if self.source_id == entity_id {
            Some(&self.target_id)
        } else if self.target_id == entity_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Which side of a relationship an entity must be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// `source_id == entity`
    Outgoing,
    /// `target_id == entity`
    Incoming,
    #[default]
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
            Direction::Both => "both",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn works_on() -> Relationship {
        Relationship::new("r-1", "alice", "apollo", "works on").with_description("Alice works on Apollo")
    }

    #[test]
    fn test_new_defaults_strength_to_one() {
        assert_eq!(works_on().strength, 1.0);
    }

    #[test]
    fn test_normalize_upper_snakes_type_and_fills_strength() {
        let mut r = works_on().with_strength(0.0);
        r.normalize();
        assert_eq!(r.relationship_type, "WORKS_ON");
        assert_eq!(r.strength, 1.0);
    }

    #[test]
    fn test_out_of_range_strength_is_rejected() {
        for bad in [1.5_f32, -0.1, f32::NAN] {
            let err = works_on().with_strength(bad).validate().unwrap_err();
            assert!(matches!(err, GraphError::InvalidStrength { .. }), "strength {bad}");
        }
    }

    #[test]
    fn test_boundary_strengths_are_valid() {
        assert!(works_on().with_strength(0.0).validate().is_ok());
        assert!(works_on().with_strength(1.0).validate().is_ok());
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = Relationship::new("r", "", "b", "X").validate().unwrap_err();
        assert!(matches!(err, GraphError::MissingRequiredField { field: "source_id" }));
        let err = Relationship::new("r", "a", "", "X").validate().unwrap_err();
        assert!(matches!(err, GraphError::MissingRequiredField { field: "target_id" }));
        let err = Relationship::new("r", "a", "b", " - ").validate().unwrap_err();
        assert!(matches!(err, GraphError::MissingRequiredField { field: "type" }));
        let err = Relationship::new("", "a", "b", "X").validate().unwrap_err();
        assert!(matches!(err, GraphError::InvalidId(_)));
    }

    #[test]
    fn test_other_end() {
        let r = works_on();
        assert_eq!(r.other_end("alice"), Some("apollo"));
        assert_eq!(r.other_end("apollo"), Some("alice"));
        assert_eq!(r.other_end("bob"), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut r = works_on().with_property("since", 2021).with_tenant("org-1");
        r.normalize();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"type\":\"WORKS_ON\""));
        let back: Relationship = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
