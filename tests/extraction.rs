//! Integration tests for LLM extraction, deduplication, schemas and ingestion.

mod helpers;

use graphrag_rs::{
    Direction, EntityTypeDef, ErrorKind, ExtractionOptions, GraphError, GraphSchema, ReadOptions,
    RelationshipOptions, RelationshipTypeDef, StoreOptions,
};

use helpers::{ctx, embedded_graph, plain_graph, seed_team, MockLlm};

const TEAM_REPLY: &str = r#"Here is what I found:
{
  "entities": [
    {"name": "Alice", "type": "Person", "description": "Engineer"},
    {"name": "Apollo", "type": "Project", "description": "A rewrite"}
  ],
  "relationships": [
    {"source": "Alice", "target": "Apollo", "type": "works on", "description": "Alice builds Apollo", "strength": 0.7},
    {"source": "Alice", "target": "Zeus", "type": "KNOWS"}
  ],
  "confidence": 0.85
}
Let me know if you need anything else."#;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_text_never_calls_llm() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::replying(TEAM_REPLY);

    let result = graph
        .extract_from_text(&ctx(), "  \n\t ", &llm, &ExtractionOptions::default())
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.confidence, 0.0);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_relationships_to_unextracted_entities_are_dropped() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::replying(TEAM_REPLY);

    let result = graph
        .extract_from_text(&ctx(), "Alice works on Apollo.", &llm, &ExtractionOptions::default())
        .await
        .unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(result.entities.len(), 2);
    assert_eq!(result.relationships.len(), 1);
    assert_eq!(result.confidence, 0.85);
    assert_eq!(result.source_text, "Alice works on Apollo.");

    let rel = &result.relationships[0];
    let alice = result.entities.iter().find(|e| e.name == "Alice").unwrap();
    let apollo = result.entities.iter().find(|e| e.name == "Apollo").unwrap();
    assert_eq!(rel.source_id, alice.id);
    assert_eq!(rel.target_id, apollo.id);
    assert_eq!(rel.relationship_type, "WORKS_ON");
    assert_eq!(rel.strength, 0.7);
}

#[tokio::test]
async fn test_unparseable_reply_is_low_confidence_empty_result() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::replying("I'm sorry, I can't help with that.");

    let result = graph
        .extract_from_text(&ctx(), "Some text.", &llm, &ExtractionOptions::default())
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.confidence, 0.3);
}

#[tokio::test]
async fn test_llm_failure_is_extraction_failed() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::failing("model overloaded");

    let err = graph
        .extract_from_text(&ctx(), "Some text.", &llm, &ExtractionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ExtractionFailed(_)));
    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
}

#[tokio::test]
async fn test_entities_carry_resolved_tenant() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::replying(TEAM_REPLY);

    let result = graph
        .extract_from_text(
            &ctx().with_tenant("ctx-org"),
            "Alice works on Apollo.",
            &llm,
            &ExtractionOptions::default(),
        )
        .await
        .unwrap();
    assert!(result.entities.iter().all(|e| e.tenant.as_deref() == Some("ctx-org")));
    assert!(result.relationships.iter().all(|r| r.tenant.as_deref() == Some("ctx-org")));
}

#[tokio::test]
async fn test_max_entities_truncates_after_dedup() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::replying(TEAM_REPLY);

    let result = graph
        .extract_from_text(
            &ctx(),
            "Alice works on Apollo.",
            &llm,
            &ExtractionOptions::default().with_max_entities(1),
        )
        .await
        .unwrap();
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].name, "Alice");
    assert!(result.relationships.is_empty());
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

const DUPLICATE_REPLY: &str = r#"{
  "entities": [
    {"name": "TechCorp", "type": "Organization", "description": "A software company"},
    {"name": "TechCorp Inc.", "type": "Organization", "description": "A software company"},
    {"name": "Alice", "type": "Person", "description": "Engineer"}
  ],
  "relationships": [
    {"source": "Alice", "target": "TechCorp Inc.", "type": "WORKS_AT"},
    {"source": "TechCorp", "target": "TechCorp Inc.", "type": "SAME_AS"}
  ],
  "confidence": 0.9
}"#;

#[tokio::test]
async fn test_near_duplicate_entities_merge() {
    let (graph, _) = embedded_graph();
    let llm = MockLlm::replying(DUPLICATE_REPLY);

    let result = graph
        .extract_from_text(
            &ctx(),
            "Alice joined TechCorp Inc. TechCorp makes software.",
            &llm,
            &ExtractionOptions::default().with_similarity_threshold(0.85),
        )
        .await
        .unwrap();

    assert_eq!(result.entities.len(), 2);
    let corp = result.entities.iter().find(|e| e.entity_type == "Organization").unwrap();
    assert_eq!(corp.name, "TechCorp Inc.");

    // WORKS_AT is re-pointed at the survivor; SAME_AS became a self-loop and is gone.
    assert_eq!(result.relationships.len(), 1);
    assert_eq!(result.relationships[0].target_id, corp.id);
}

#[tokio::test]
async fn test_dedup_disabled_without_threshold() {
    let (graph, _) = embedded_graph();
    let llm = MockLlm::replying(DUPLICATE_REPLY);

    let result = graph
        .extract_from_text(&ctx(), "text", &llm, &ExtractionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.entities.len(), 3);
    assert_eq!(result.relationships.len(), 2);
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

fn team_schema() -> GraphSchema {
    GraphSchema {
        entity_types: vec![
            EntityTypeDef::new("Person", "A human"),
            EntityTypeDef::new("Project", "A body of work"),
        ],
        relationship_types: vec![
            RelationshipTypeDef::new("WORKS_ON", "Contributes to").between(["Person"], ["Project"]),
        ],
    }
}

#[tokio::test]
async fn test_schema_guided_prompt_lists_types() {
    let (graph, _) = plain_graph();
    graph.apply_schema(team_schema());
    let llm = MockLlm::replying(TEAM_REPLY);

    graph
        .extract_from_text(&ctx(), "text", &llm, &ExtractionOptions::default().schema_guided(true))
        .await
        .unwrap();
    let prompt = llm.last_user_prompt().unwrap();
    assert!(prompt.contains("- Person: A human"));
    assert!(prompt.contains("WORKS_ON: Contributes to (from Person to Project)"));
}

#[tokio::test]
async fn test_applied_schema_is_returned_verbatim() {
    let (graph, backend) = plain_graph();
    graph.apply_schema(team_schema());
    let schema = graph.discover_schema(&ctx(), None).await.unwrap();
    assert_eq!(schema, team_schema());
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_schema_discovery_from_stored_types() {
    let (graph, _) = plain_graph();
    seed_team(&graph, &StoreOptions::default()).await;

    let schema = graph.discover_schema(&ctx(), None).await.unwrap();
    assert_eq!(schema.entity_type_names(), vec!["Person", "Project"]);
    assert_eq!(schema.entity_types[0].description, "Discovered entity type: Person");
    let mut rels = schema.relationship_type_names();
    rels.sort();
    assert_eq!(rels, vec!["KNOWS", "MANAGES", "WORKS_ON"]);
    assert!(schema.relationship_types[0].description.starts_with("Discovered relationship type: "));
}

#[tokio::test]
async fn test_schema_discovery_tolerates_aggregation_failure() {
    let (graph, backend) = plain_graph();
    seed_team(&graph, &StoreOptions::default()).await;
    backend.set_fail_aggregations(true);

    let schema = graph.discover_schema(&ctx(), None).await.unwrap();
    assert!(schema.is_empty());
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ingest_persists_extracted_graph() {
    let (graph, _) = plain_graph();
    let llm = MockLlm::replying(TEAM_REPLY);

    let report = graph
        .ingest_text(
            &ctx(),
            "Alice works on Apollo.",
            &llm,
            &ExtractionOptions::default().with_tenant("org-7"),
        )
        .await
        .unwrap();
    assert_eq!(report.entities.stored, 2);
    assert_eq!(report.relationships.stored, 1);

    let alice = report.extraction.entities.iter().find(|e| e.name == "Alice").unwrap();
    let stored = graph
        .get_entity(&ctx(), &alice.id, &ReadOptions::default().with_tenant("org-7"))
        .await
        .unwrap();
    assert_eq!(stored.tenant.as_deref(), Some("org-7"));

    let rels = graph
        .get_relationships(
            &ctx(),
            &alice.id,
            Direction::Outgoing,
            &RelationshipOptions::default().with_tenant("org-7"),
        )
        .await
        .unwrap();
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].relationship_type, "WORKS_ON");
}
