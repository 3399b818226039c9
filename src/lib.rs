//! # graphrag-rs
//!
//! Knowledge-graph engine for LLM agents, layered on a document/vector store
//! that has no graph primitives of its own.
//!
//! ## Architecture
//!
//! - **Repository**: entities and relationships with tenant isolation, batching and embeddings
//! - **Search**: vector, BM25 keyword and hybrid retrieval, plus local and global search
//! - **Traversal**: bounded BFS context expansion and shortest paths
//! - **Extraction**: LLM-driven entity/relationship extraction with embedding dedup
//! - **Schema**: applied or discovered entity/relationship type catalogues

pub mod edges;
pub mod errors;
pub mod nodes;
pub mod types;

pub mod context;
pub mod driver;
pub mod embedder;
pub mod llm_client;

pub mod extraction;
pub mod prompts;
pub mod schema;
pub mod search;
pub mod store;
pub mod traversal;

pub mod graph;
pub mod pipeline;
pub mod utils;

pub use context::RequestContext;
pub use edges::{Direction, Relationship};
pub use errors::{ErrorKind, GraphError, LlmError, Result};
pub use extraction::{ExtractionOptions, ExtractionResult};
pub use graph::KnowledgeGraph;
pub use nodes::Entity;
pub use pipeline::IngestReport;
pub use schema::{EntityTypeDef, GraphSchema, RelationshipTypeDef};
pub use search::{SearchMode, SearchOptions, SearchResult};
pub use store::{BatchReport, ReadOptions, RelationshipOptions, StoreOptions};
pub use traversal::{GraphContext, GraphPath, PathOptions, TraversalOptions};
pub use types::GraphConfig;
