//! Object store backend abstraction.
//!
//! Defines the [`ObjectStore`] trait every backend must satisfy: a
//! collection-based document store with vector similarity and boolean-filter
//! queries, but no native graph traversal. Graph semantics (entities,
//! relationships, BFS) are layered on top in [`crate::store`] and
//! [`crate::traversal`].
//!
//! The crate ships [`memory::MemoryObjectStore`]; remote vector databases
//! plug in by implementing the same trait.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::Result;

/// Backend-assigned identity of a stored object.
///
/// Distinct from any domain `id` property: the backend chooses it at insert
/// time and it is only learned by querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub Uuid);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An object to insert or to overwrite an existing one with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewObject {
    pub properties: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
}

/// An object returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub handle: ObjectHandle,
    pub properties: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
    /// Query-specific relevance (certainty, BM25 or fused score); `None` for plain fetches.
    pub score: Option<f32>,
}

/// Boolean filter over top-level object properties.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal { field: String, value: Value },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equal { field: field.into(), value: value.into() }
    }

    /// AND of the given filters; a single filter is returned as-is, none yields `None`.
    pub fn all(filters: Vec<Filter>) -> Option<Filter> {
        Self::combine(filters, Filter::And)
    }

    /// OR of the given filters; a single filter is returned as-is, none yields `None`.
    pub fn any(filters: Vec<Filter>) -> Option<Filter> {
        Self::combine(filters, Filter::Or)
    }

    fn combine(mut filters: Vec<Filter>, join: fn(Vec<Filter>) -> Filter) -> Option<Filter> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(join(filters)),
        }
    }

    /// Evaluate the filter against an object's properties.
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            Filter::Equal { field, value } => properties.get(field) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(properties)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(properties)),
        }
    }
}

/// One row of a grouped aggregation: a distinct value and how many objects hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    pub value: String,
    pub count: usize,
}

/// Per-object outcome of a batch insert.
pub type InsertOutcome = std::result::Result<ObjectHandle, String>;

/// A vector-capable document store.
///
/// A method-level `Err` means the request itself failed. Batch inserts report
/// per-object failures inside the returned vector instead.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Insert objects; returns one outcome per input, in order.
    async fn insert_batch(&self, collection: &str, objects: Vec<NewObject>)
        -> Result<Vec<InsertOutcome>>;

    /// Objects matching `filter` (all objects when `None`), in insertion order.
    async fn fetch(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredObject>>;

    /// Nearest neighbours of `vector`; `score` is a certainty in `[0, 1]`.
    async fn near_vector(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<StoredObject>>;

    /// BM25 full-text query over `fields`; `score` is the raw BM25 score.
    async fn bm25(
        &self,
        collection: &str,
        query: &str,
        fields: &[&str],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<StoredObject>>;

    /// Blend of vector certainty (weight `alpha`) and normalised BM25 (weight `1 - alpha`).
    #[allow(clippy::too_many_arguments)]
    async fn hybrid(
        &self,
        collection: &str,
        query: &str,
        vector: &[f32],
        alpha: f32,
        fields: &[&str],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<StoredObject>>;

    /// Overwrite the object behind `handle`.
    async fn update(&self, collection: &str, handle: ObjectHandle, object: NewObject) -> Result<()>;

    /// Remove the object behind `handle`.
    async fn delete(&self, collection: &str, handle: ObjectHandle) -> Result<()>;

    /// Distinct values of `field` with counts, most frequent first.
    async fn aggregate_group_by(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<GroupCount>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn equal_filter_matches_exact_value() {
        let p = props(json!({ "id": "a", "orgId": "t1" }));
        assert!(Filter::eq("id", "a").matches(&p));
        assert!(!Filter::eq("id", "b").matches(&p));
        assert!(!Filter::eq("missing", "a").matches(&p));
    }

    #[test]
    fn and_or_combinators() {
        let p = props(json!({ "sourceId": "a", "targetId": "b", "orgId": "t1" }));
        let either = Filter::any(vec![Filter::eq("sourceId", "b"), Filter::eq("targetId", "b")])
            .unwrap();
        let scoped = Filter::all(vec![either, Filter::eq("orgId", "t1")]).unwrap();
        assert!(scoped.matches(&p));

        let wrong_tenant = Filter::all(vec![Filter::eq("orgId", "t2"), Filter::eq("sourceId", "a")])
            .unwrap();
        assert!(!wrong_tenant.matches(&p));
    }

    #[test]
    fn combine_collapses_trivial_lists() {
        assert_eq!(Filter::all(vec![]), None);
        assert_eq!(Filter::any(vec![Filter::eq("a", 1)]), Some(Filter::eq("a", 1)));
    }
}
