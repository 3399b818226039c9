//! LLM-driven entity and relationship extraction.
//!
//! One LLM call per text. The reply is treated as untrusted: the first
//! balanced JSON object is recovered from it, malformed replies degrade to an
//! empty low-confidence result, and relationships whose endpoints were not
//! extracted are dropped.

pub mod dedup;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::edges::{Relationship, DEFAULT_STRENGTH};
use crate::errors::{GraphError, Result};
use crate::llm_client::LlmClient;
use crate::nodes::Entity;
use crate::prompts::{build_extraction_messages, ExtractionPromptInput};
use crate::schema::{GraphSchema, SchemaManager};
use crate::store::GraphStore;
use crate::utils::{
    extract_first_json_object, normalize_whitespace, to_upper_snake_case, truncate_with_ellipsis,
};

/// Entity cap applied when `max_entities` is `0`.
pub const DEFAULT_MAX_ENTITIES: usize = 50;
/// Confidence reported when the reply held no usable JSON.
pub const UNPARSEABLE_CONFIDENCE: f32 = 0.3;
/// Confidence assumed when the reply omits one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
/// Type given to extracted entities that arrive without one.
pub const FALLBACK_ENTITY_TYPE: &str = "Entity";

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Constrain the prompt and the results with the applied schema.
    pub schema_guided: bool,
    /// Entity-type allow-list, matched case-insensitively.
    pub entity_types: Vec<String>,
    /// Relationship-type allow-list, matched after upper-snake normalisation.
    pub relationship_types: Vec<String>,
    /// Entities are dropped when the overall confidence is below this.
    pub min_confidence: f32,
    /// Keep at most this many entities after dedup; `0` means [`DEFAULT_MAX_ENTITIES`].
    pub max_entities: usize,
    /// Cosine similarity at which entities merge; `0` disables dedup.
    pub similarity_threshold: f32,
    pub tenant: Option<String>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            schema_guided: false,
            entity_types: Vec::new(),
            relationship_types: Vec::new(),
            min_confidence: 0.0,
            max_entities: DEFAULT_MAX_ENTITIES,
            similarity_threshold: 0.0,
            tenant: None,
        }
    }
}

impl ExtractionOptions {
    pub fn schema_guided(mut self, enabled: bool) -> Self {
        self.schema_guided = enabled;
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

    pub fn with_relationship_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationship_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub source_text: String,
    pub confidence: f32,
}

impl ExtractionResult {
    fn empty(source_text: &str, confidence: f32) -> Self {
        Self {
            source_text: source_text.to_string(),
            confidence,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reply shape. Every field is optional: models omit and null things freely.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Option<Vec<RawEntity>>,
    #[serde(default)]
    relationships: Option<Vec<RawRelationship>>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    entity_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default, rename = "type")]
    relationship_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    strength: Option<f64>,
}

fn parse_reply(reply: &str) -> Option<RawExtraction> {
    let json = extract_first_json_object(reply)?;
    match serde_json::from_str::<RawExtraction>(json) {
        Ok(raw) => Some(raw),
        Err(e) => {
            debug!(error = %e, "extraction reply JSON has an unexpected shape");
            None
        }
    }
}

fn clamp_confidence(value: Option<f64>) -> f32 {
    match value {
        Some(c) if c.is_finite() => (c as f32).clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Missing or zero strength means the default; anything outside `[0, 1]` is rejected.
fn parse_strength(value: Option<f64>) -> Option<f32> {
    match value {
        None => Some(DEFAULT_STRENGTH),
        Some(s) if s == 0.0 => Some(DEFAULT_STRENGTH),
        Some(s) if s.is_finite() && (0.0..=1.0).contains(&s) => Some(s as f32),
        Some(_) => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| normalize_whitespace(&s)).filter(|s| !s.is_empty())
}

/// Turns text into entities and relationships through an [`LlmClient`].
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    store: GraphStore,
    schema: SchemaManager,
}

impl ExtractionEngine {
    pub fn new(store: GraphStore, schema: SchemaManager) -> Self {
        Self { store, schema }
    }

    /// Extract a graph fragment from `text`. Nothing is persisted.
    pub async fn extract_from_text(
        &self,
        ctx: &RequestContext,
        text: &str,
        llm: &dyn LlmClient,
        opts: &ExtractionOptions,
    ) -> Result<ExtractionResult> {
        if text.trim().is_empty() {
            return Ok(ExtractionResult::empty(text, 0.0));
        }

        let schema = if opts.schema_guided { self.schema.applied_schema() } else { None };
        let messages = build_extraction_messages(&ExtractionPromptInput {
            text,
            schema: schema.as_ref(),
            entity_types: &opts.entity_types,
            relationship_types: &opts.relationship_types,
        });

        let reply = match ctx.run(llm.generate(&messages)).await {
            Ok(reply) => reply,
            Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
            Err(e) => return Err(GraphError::ExtractionFailed(Box::new(e))),
        };

        let Some(raw) = parse_reply(&reply) else {
            warn!(reply = %truncate_with_ellipsis(&reply, 200), "no JSON object in extraction reply");
            return Ok(ExtractionResult::empty(text, UNPARSEABLE_CONFIDENCE));
        };

        let tenant = self.store.resolve_tenant(opts.tenant.as_deref(), ctx);
        let mut result = materialize(raw, text, opts, schema.as_ref(), tenant.as_deref());

        if opts.similarity_threshold > 0.0 && result.entities.len() > 1 {
            self.deduplicate(ctx, &mut result, opts.similarity_threshold).await?;
        }
        truncate(&mut result, opts.max_entities);

        debug!(
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            confidence = result.confidence,
            "extraction complete"
        );
        Ok(result)
    }

    async fn deduplicate(
        &self,
        ctx: &RequestContext,
        result: &mut ExtractionResult,
        threshold: f32,
    ) -> Result<()> {
        let Some(embedder) = self.store.embedder().map(Arc::clone) else {
            return Ok(());
        };
        let texts: Vec<String> = result.entities.iter().map(dedup::dedup_text).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = match ctx.run(embedder.embed_batch(&refs)).await {
            Ok(v) if v.len() == refs.len() => v,
            Ok(v) => {
                warn!(expected = refs.len(), got = v.len(), "embedding count mismatch, skipping dedup");
                return Ok(());
            }
            Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
            Err(e) => {
                warn!(error = %e, "dedup embedding failed, skipping dedup");
                return Ok(());
            }
        };

        let before = result.entities.len();
        let clustered = dedup::cluster_entities(std::mem::take(&mut result.entities), &embeddings, threshold);
        for rel in &mut result.relationships {
            rel.source_id = clustered.resolve(&rel.source_id).to_string();
            rel.target_id = clustered.resolve(&rel.target_id).to_string();
        }
        result.relationships.retain(|r| r.source_id != r.target_id);
        result.entities = clustered.entities;
        debug!(before, after = result.entities.len(), "deduplicated entities");
        Ok(())
    }
}

/// Build domain objects from a parsed reply.
fn materialize(
    raw: RawExtraction,
    text: &str,
    opts: &ExtractionOptions,
    schema: Option<&GraphSchema>,
    tenant: Option<&str>,
) -> ExtractionResult {
    let confidence = clamp_confidence(raw.confidence);
    let mut result = ExtractionResult::empty(text, confidence);

    if confidence < opts.min_confidence {
        debug!(confidence, min = opts.min_confidence, "extraction below confidence threshold");
        return result;
    }

    let entity_allow: Vec<String> = if !opts.entity_types.is_empty() {
        opts.entity_types.clone()
    } else {
        schema.map(GraphSchema::entity_type_names).unwrap_or_default()
    };
    let relationship_allow: HashSet<String> = if !opts.relationship_types.is_empty() {
        opts.relationship_types.iter().map(|t| to_upper_snake_case(t)).collect()
    } else {
        schema
            .map(|s| s.relationship_type_names().iter().map(|t| to_upper_snake_case(t)).collect())
            .unwrap_or_default()
    };

    let mut by_name = NameIndex::default();
    for raw_entity in raw.entities.unwrap_or_default() {
        let Some(name) = non_blank(raw_entity.name) else {
            continue;
        };
        let entity_type =
            non_blank(raw_entity.entity_type).unwrap_or_else(|| FALLBACK_ENTITY_TYPE.to_string());
        if !entity_allow.is_empty() && !entity_allow.iter().any(|t| t.eq_ignore_ascii_case(&entity_type)) {
            debug!(name = %name, entity_type = %entity_type, "entity type not allowed");
            continue;
        }
        if by_name.contains(&name) {
            continue;
        }

        let mut entity = Entity::new(Uuid::new_v4().to_string(), name.clone(), entity_type.clone())
            .with_description(raw_entity.description.unwrap_or_default().trim());
        entity.tenant = tenant.map(ToOwned::to_owned);
        by_name.insert(name, entity.id.clone(), entity_type);
        result.entities.push(entity);
    }

    for raw_rel in raw.relationships.unwrap_or_default() {
        let (Some(source), Some(target)) = (non_blank(raw_rel.source), non_blank(raw_rel.target)) else {
            continue;
        };
        let (Some((source_id, source_type)), Some((target_id, target_type))) =
            (by_name.lookup(&source), by_name.lookup(&target))
        else {
            continue;
        };
        let relationship_type = to_upper_snake_case(raw_rel.relationship_type.as_deref().unwrap_or(""));
        if relationship_type.is_empty() {
            continue;
        }
        let Some(strength) = parse_strength(raw_rel.strength) else {
            debug!(
                relationship_type = %relationship_type,
                strength = ?raw_rel.strength,
                "relationship strength out of range"
            );
            continue;
        };
        if !relationship_allow.is_empty() && !relationship_allow.contains(&relationship_type) {
            continue;
        }
        if let Some(schema) = schema {
            if !schema.allows_relationship(&relationship_type, source_type, target_type) {
                debug!(relationship_type = %relationship_type, "relationship violates schema");
                continue;
            }
        }

        let mut rel = Relationship::new(
            Uuid::new_v4().to_string(),
            source_id.clone(),
            target_id.clone(),
            relationship_type,
        )
        .with_description(raw_rel.description.unwrap_or_default().trim())
        .with_strength(strength);
        rel.tenant = tenant.map(ToOwned::to_owned);
        result.relationships.push(rel);
    }

    result
}

/// Extracted names in first-seen order, each with its entity id and type.
#[derive(Default)]
struct NameIndex {
    entries: Vec<(String, String, String)>,
    exact: HashMap<String, usize>,
}

impl NameIndex {
    fn contains(&self, name: &str) -> bool {
        self.exact.contains_key(name)
    }

    fn insert(&mut self, name: String, id: String, entity_type: String) {
        self.exact.insert(name.clone(), self.entries.len());
        self.entries.push((name, id, entity_type));
    }

    /// Exact name match first, then the earliest case-insensitive one.
    fn lookup(&self, name: &str) -> Option<(&String, &String)> {
        let idx = self.exact.get(name).copied().or_else(|| {
            self.entries.iter().position(|(n, _, _)| n.eq_ignore_ascii_case(name))
        })?;
        let (_, id, entity_type) = &self.entries[idx];
        Some((id, entity_type))
    }
}

/// Keep the first `max_entities` entities and the relationships between them.
fn truncate(result: &mut ExtractionResult, max_entities: usize) {
    let cap = if max_entities == 0 { DEFAULT_MAX_ENTITIES } else { max_entities };
    if result.entities.len() <= cap {
        return;
    }
    result.entities.truncate(cap);
    let kept: HashSet<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    result
        .relationships
        .retain(|r| kept.contains(r.source_id.as_str()) && kept.contains(r.target_id.as_str()));
}
