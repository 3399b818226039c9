//! Node types for the knowledge graph.

pub mod entity;

pub use entity::Entity;
