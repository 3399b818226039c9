//! Ingestion pipeline.
//!
//! Text in, persisted graph fragment out:
//! 1. **Extract** entities and relationships with the LLM
//! 2. **Deduplicate** extracted entities by embedding similarity
//! 3. **Persist** entities, then relationships, under one tenant

use serde::Serialize;
use tracing::info;

use crate::context::RequestContext;
use crate::errors::Result;
use crate::extraction::{ExtractionOptions, ExtractionResult};
use crate::graph::KnowledgeGraph;
use crate::llm_client::LlmClient;
use crate::store::{BatchReport, StoreOptions};

/// What one ingestion call extracted and how much of it was written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub extraction: ExtractionResult,
    pub entities: BatchReport,
    pub relationships: BatchReport,
}

impl KnowledgeGraph {
    /// Extract from `text` and persist the result.
    ///
    /// The tenant in `opts` (or the context/default) is used for both the
    /// extracted records and the writes. Entities are written before
    /// relationships; a failed entity batch stops the call before any
    /// relationship is written.
    pub async fn ingest_text(
        &self,
        ctx: &RequestContext,
        text: &str,
        llm: &dyn LlmClient,
        opts: &ExtractionOptions,
    ) -> Result<IngestReport> {
        let extraction = self.extract_from_text(ctx, text, llm, opts).await?;

        let store_opts = StoreOptions {
            tenant: self.store().resolve_tenant(opts.tenant.as_deref(), ctx),
            ..Default::default()
        };
        let entities = self
            .store_entities(ctx, extraction.entities.clone(), &store_opts)
            .await?;
        let relationships = self
            .store_relationships(ctx, extraction.relationships.clone(), &store_opts)
            .await?;

        info!(
            entities = entities.stored,
            relationships = relationships.stored,
            confidence = extraction.confidence,
            "ingested text"
        );
        Ok(IngestReport { extraction, entities, relationships })
    }
}
