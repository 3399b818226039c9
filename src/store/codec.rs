//! Mapping between domain objects and backend objects.
//!
//! Backend field names are camelCase; `properties` travel as an opaque JSON
//! string so the backend schema never has to know their shape.

use serde_json::{Map, Value};

use crate::driver::{NewObject, StoredObject};
use crate::edges::Relationship;
use crate::errors::{GraphError, Result};
use crate::nodes::Entity;
use crate::utils::{format_timestamp, parse_flexible_datetime};

pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_NAME: &str = "name";
pub(crate) const FIELD_DESCRIPTION: &str = "description";
pub(crate) const FIELD_ENTITY_TYPE: &str = "entityType";
pub(crate) const FIELD_PROPERTIES: &str = "properties";
pub(crate) const FIELD_TENANT: &str = "orgId";
pub(crate) const FIELD_CREATED_AT: &str = "createdAt";
pub(crate) const FIELD_UPDATED_AT: &str = "updatedAt";
pub(crate) const FIELD_SOURCE_ID: &str = "sourceId";
pub(crate) const FIELD_TARGET_ID: &str = "targetId";
pub(crate) const FIELD_RELATIONSHIP_TYPE: &str = "relationshipType";
pub(crate) const FIELD_STRENGTH: &str = "strength";

/// Fields searched by keyword and hybrid queries.
pub(crate) const ENTITY_TEXT_FIELDS: &[&str] = &[FIELD_NAME, FIELD_DESCRIPTION, FIELD_ENTITY_TYPE];

pub(crate) fn entity_to_object(entity: &Entity) -> Result<NewObject> {
    let mut props = Map::new();
    props.insert(FIELD_ID.into(), entity.id.clone().into());
    props.insert(FIELD_NAME.into(), entity.name.clone().into());
    props.insert(FIELD_ENTITY_TYPE.into(), entity.entity_type.clone().into());
    props.insert(FIELD_DESCRIPTION.into(), entity.description.clone().into());
    props.insert(FIELD_PROPERTIES.into(), encode_properties(&entity.properties)?.into());
    props.insert(FIELD_TENANT.into(), entity.tenant.clone().unwrap_or_default().into());
    props.insert(FIELD_CREATED_AT.into(), timestamp_value(entity.created_at.as_ref()));
    props.insert(FIELD_UPDATED_AT.into(), timestamp_value(entity.updated_at.as_ref()));
    Ok(NewObject { properties: props, vector: entity.embedding.clone() })
}

pub(crate) fn entity_from_object(object: StoredObject) -> Result<Entity> {
    let props = &object.properties;
    Ok(Entity {
        id: required_str(props, FIELD_ID)?,
        name: required_str(props, FIELD_NAME)?,
        entity_type: required_str(props, FIELD_ENTITY_TYPE)?,
        description: optional_str(props, FIELD_DESCRIPTION).unwrap_or_default(),
        properties: decode_properties(props)?,
        embedding: object.vector,
        tenant: optional_str(props, FIELD_TENANT),
        created_at: optional_str(props, FIELD_CREATED_AT)
            .and_then(|s| parse_flexible_datetime(&s)),
        updated_at: optional_str(props, FIELD_UPDATED_AT)
            .and_then(|s| parse_flexible_datetime(&s)),
    })
}

pub(crate) fn relationship_to_object(rel: &Relationship) -> Result<NewObject> {
    let mut props = Map::new();
    props.insert(FIELD_ID.into(), rel.id.clone().into());
    props.insert(FIELD_SOURCE_ID.into(), rel.source_id.clone().into());
    props.insert(FIELD_TARGET_ID.into(), rel.target_id.clone().into());
    props.insert(FIELD_RELATIONSHIP_TYPE.into(), rel.relationship_type.clone().into());
    props.insert(FIELD_DESCRIPTION.into(), rel.description.clone().into());
    props.insert(FIELD_STRENGTH.into(), Value::from(f64::from(rel.strength)));
    props.insert(FIELD_PROPERTIES.into(), encode_properties(&rel.properties)?.into());
    props.insert(FIELD_TENANT.into(), rel.tenant.clone().unwrap_or_default().into());
    props.insert(FIELD_CREATED_AT.into(), timestamp_value(rel.created_at.as_ref()));
    Ok(NewObject { properties: props, vector: None })
}

pub(crate) fn relationship_from_object(object: StoredObject) -> Result<Relationship> {
    let props = &object.properties;
    let strength = props
        .get(FIELD_STRENGTH)
        .and_then(Value::as_f64)
        .map(|s| s as f32)
        .unwrap_or(crate::edges::DEFAULT_STRENGTH);
    Ok(Relationship {
        id: required_str(props, FIELD_ID)?,
        source_id: required_str(props, FIELD_SOURCE_ID)?,
        target_id: required_str(props, FIELD_TARGET_ID)?,
        relationship_type: required_str(props, FIELD_RELATIONSHIP_TYPE)?,
        description: optional_str(props, FIELD_DESCRIPTION).unwrap_or_default(),
        strength,
        properties: decode_properties(props)?,
        tenant: optional_str(props, FIELD_TENANT),
        created_at: optional_str(props, FIELD_CREATED_AT)
            .and_then(|s| parse_flexible_datetime(&s)),
    })
}

fn encode_properties(properties: &Map<String, Value>) -> Result<String> {
    if properties.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(properties)?)
}

fn decode_properties(props: &Map<String, Value>) -> Result<Map<String, Value>> {
    match props.get(FIELD_PROPERTIES) {
        Some(Value::String(raw)) if !raw.is_empty() => Ok(serde_json::from_str(raw)?),
        _ => Ok(Map::new()),
    }
}

fn timestamp_value(ts: Option<&chrono::DateTime<chrono::Utc>>) -> Value {
    ts.map(|t| Value::String(format_timestamp(t)))
        .unwrap_or(Value::Null)
}

fn required_str(props: &Map<String, Value>, field: &'static str) -> Result<String> {
    optional_str(props, field).ok_or_else(|| {
        GraphError::Driver(format!("stored object is missing string field '{field}'"))
    })
}

fn optional_str(props: &Map<String, Value>, field: &str) -> Option<String> {
    props
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ObjectHandle;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn stored(object: NewObject) -> StoredObject {
        StoredObject {
            handle: ObjectHandle(Uuid::new_v4()),
            properties: object.properties,
            vector: object.vector,
            score: None,
        }
    }

    #[test]
    fn entity_roundtrip_keeps_properties_and_timestamps() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut entity = Entity::new("e-1", "Acme", "Organization")
            .with_description("Makes anvils")
            .with_property("nested", json!({"a": [1, 2, {"b": null}]}))
            .with_property("founded", 1949)
            .with_tenant("org-1")
            .with_embedding(vec![0.1, 0.2]);
        entity.created_at = Some(ts);
        entity.updated_at = Some(ts);

        let object = entity_to_object(&entity).unwrap();
        assert!(object.properties[FIELD_PROPERTIES].is_string());
        assert_eq!(object.properties[FIELD_TENANT], json!("org-1"));

        let back = entity_from_object(stored(object)).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn unscoped_entity_decodes_without_tenant() {
        let object = entity_to_object(&Entity::new("e", "n", "t")).unwrap();
        assert_eq!(object.properties[FIELD_TENANT], json!(""));
        let back = entity_from_object(stored(object)).unwrap();
        assert!(back.tenant.is_none());
        assert!(back.properties.is_empty());
    }

    #[test]
    fn relationship_roundtrip() {
        let mut rel = Relationship::new("r-1", "a", "b", "WORKS_ON")
            .with_strength(0.25)
            .with_property("since", 2020)
            .with_tenant("org-1");
        rel.created_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let back = relationship_from_object(stored(relationship_to_object(&rel).unwrap())).unwrap();
        assert_eq!(back, rel);
    }

    #[test]
    fn missing_required_field_is_a_driver_error() {
        let mut object = entity_to_object(&Entity::new("e", "n", "t")).unwrap();
        object.properties.remove(FIELD_NAME);
        let err = entity_from_object(stored(object)).unwrap_err();
        assert!(matches!(err, GraphError::Driver(msg) if msg.contains("name")));
    }

    #[test]
    fn corrupt_properties_is_a_serialization_error() {
        let mut object = entity_to_object(&Entity::new("e", "n", "t")).unwrap();
        object.properties.insert(FIELD_PROPERTIES.into(), json!("{not json"));
        let err = entity_from_object(stored(object)).unwrap_err();
        assert!(matches!(err, GraphError::Serialization(_)));
    }
}
