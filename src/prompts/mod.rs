//! Prompt templates for LLM interactions.
//!
//! Prompts are stored as Rust string literals (not external files) for
//! compile-time inclusion.

pub mod extract_graph;

pub use extract_graph::{build_extraction_messages, ExtractionPromptInput};
