//! Edge types for the knowledge graph.

pub mod relationship;

pub use relationship::{Direction, Relationship, DEFAULT_STRENGTH};
