//! Entity and relationship extraction prompt.

use std::fmt::Write as _;

use crate::llm_client::Message;
use crate::schema::GraphSchema;

const SYSTEM_PROMPT: &str = "You are a knowledge graph extraction system. \
You read text and identify the entities it mentions and the relationships between them. \
You answer with a single JSON object and nothing else.";

const OUTPUT_FORMAT: &str = r#"Respond with a JSON object of this exact shape:
{
  "entities": [
    {"name": "entity name", "type": "EntityType", "description": "one sentence about the entity"}
  ],
  "relationships": [
    {"source": "source entity name", "target": "target entity name", "type": "RELATIONSHIP_TYPE", "description": "how they are related", "strength": 0.8}
  ],
  "confidence": 0.9
}

Rules:
- Relationship "source" and "target" must be names from "entities".
- Relationship types are UPPER_SNAKE_CASE.
- "strength" is between 0 and 1 and may be omitted.
- "confidence" is your overall confidence in the extraction, between 0 and 1."#;

/// Inputs that shape the extraction prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionPromptInput<'a> {
    pub text: &'a str,
    /// Enumerate the schema's types and endpoint constraints.
    pub schema: Option<&'a GraphSchema>,
    /// Used when no schema is given.
    pub entity_types: &'a [String],
    /// Used when no schema is given.
    pub relationship_types: &'a [String],
}

/// System and user messages for one extraction call.
pub fn build_extraction_messages(input: &ExtractionPromptInput<'_>) -> Vec<Message> {
    let mut user = String::from("Extract entities and relationships from the text below.\n\n");

    match input.schema.filter(|s| !s.is_empty()) {
        Some(schema) => write_schema_section(&mut user, schema),
        None => write_allow_lists(&mut user, input.entity_types, input.relationship_types),
    }

    user.push_str(OUTPUT_FORMAT);
    user.push_str("\n\nText:\n\"\"\"\n");
    user.push_str(input.text);
    user.push_str("\n\"\"\"");

    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

fn write_schema_section(out: &mut String, schema: &GraphSchema) {
    if !schema.entity_types.is_empty() {
        out.push_str("Only extract entities of these types:\n");
        for t in &schema.entity_types {
            if t.description.is_empty() {
                let _ = writeln!(out, "- {}", t.name);
            } else {
                let _ = writeln!(out, "- {}: {}", t.name, t.description);
            }
        }
        out.push('\n');
    }
    if !schema.relationship_types.is_empty() {
        out.push_str("Only extract relationships of these types:\n");
        for t in &schema.relationship_types {
            let _ = write!(out, "- {}", t.name);
            if !t.description.is_empty() {
                let _ = write!(out, ": {}", t.description);
            }
            if !t.source_types.is_empty() || !t.target_types.is_empty() {
                let _ = write!(
                    out,
                    " (from {} to {})",
                    type_list(&t.source_types),
                    type_list(&t.target_types)
                );
            }
            out.push('\n');
        }
        out.push('\n');
    }
}

fn write_allow_lists(out: &mut String, entity_types: &[String], relationship_types: &[String]) {
    if !entity_types.is_empty() {
        let _ = writeln!(out, "Only extract entities of these types: {}\n", entity_types.join(", "));
    }
    if !relationship_types.is_empty() {
        let _ = writeln!(
            out,
            "Only extract relationships of these types: {}\n",
            relationship_types.join(", ")
        );
    }
}

fn type_list(types: &[String]) -> String {
    if types.is_empty() {
        "any".to_string()
    } else {
        types.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::Role;
    use crate::schema::{EntityTypeDef, RelationshipTypeDef};

    #[test]
    fn plain_prompt_embeds_text_and_format() {
        let messages = build_extraction_messages(&ExtractionPromptInput {
            text: "Alice works at Acme.",
            ..Default::default()
        });
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("Alice works at Acme."));
        assert!(messages[1].content.contains("\"confidence\""));
        assert!(!messages[1].content.contains("Only extract"));
    }

    #[test]
    fn allow_lists_are_listed_without_schema() {
        let entity_types = vec!["Person".to_string(), "Organization".to_string()];
        let messages = build_extraction_messages(&ExtractionPromptInput {
            text: "t",
            entity_types: &entity_types,
            ..Default::default()
        });
        assert!(messages[1].content.contains("entities of these types: Person, Organization"));
    }

    #[test]
    fn schema_lists_endpoint_constraints() {
        let schema = GraphSchema {
            entity_types: vec![EntityTypeDef::new("Person", "A human")],
            relationship_types: vec![
                RelationshipTypeDef::new("WORKS_ON", "").between(["Person"], ["Project"])
            ],
        };
        let ignored = vec!["Ignored".to_string()];
        let messages = build_extraction_messages(&ExtractionPromptInput {
            text: "t",
            schema: Some(&schema),
            entity_types: &ignored,
            relationship_types: &[],
        });
        let user = &messages[1].content;
        assert!(user.contains("- Person: A human"));
        assert!(user.contains("- WORKS_ON (from Person to Project)"));
        assert!(!user.contains("Ignored"));
    }
}
