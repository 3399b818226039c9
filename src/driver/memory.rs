//! In-process [`ObjectStore`] implementation.
//!
//! Keeps every collection in memory with insertion order preserved, scores
//! keyword queries with BM25 and vector queries with cosine certainty. Used for
//! local development, tests and small embedded graphs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{Filter, GroupCount, InsertOutcome, NewObject, ObjectHandle, ObjectStore, StoredObject};
use crate::errors::{GraphError, Result};
use crate::utils::{cosine_similarity, cosine_to_certainty, tokenize};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Debug, Clone)]
struct Record {
    handle: ObjectHandle,
    properties: Map<String, Value>,
    vector: Option<Vec<f32>>,
}

impl Record {
    fn to_stored(&self, score: Option<f32>) -> StoredObject {
        StoredObject {
            handle: self.handle,
            properties: self.properties.clone(),
            vector: self.vector.clone(),
            score,
        }
    }
}

#[derive(Debug, Default)]
struct Collection {
    records: Vec<Record>,
    /// Fixed by the first vector written to the collection.
    dim: Option<usize>,
}

impl Collection {
    fn check_vector(&self, vector: Option<&Vec<f32>>) -> std::result::Result<(), String> {
        match (self.dim, vector) {
            (Some(dim), Some(v)) if v.len() != dim => Err(format!(
                "vector dimension mismatch: expected {dim}, got {}",
                v.len()
            )),
            (_, Some(v)) if v.is_empty() => Err("vector must not be empty".to_string()),
            _ => Ok(()),
        }
    }

    fn filtered<'a>(&'a self, filter: Option<&'a Filter>) -> impl Iterator<Item = &'a Record> + 'a {
        self.records
            .iter()
            .filter(move |r| filter.map_or(true, |f| f.matches(&r.properties)))
    }
}

/// Thread-safe in-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    collections: RwLock<HashMap<String, Collection>>,
    requests: AtomicUsize,
    unavailable: AtomicBool,
    fail_aggregations: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests served so far (every trait method counts once).
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of objects currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.records.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Make every subsequent request fail with a driver error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make grouped aggregations fail while other queries keep working.
    pub fn set_fail_aggregations(&self, fail: bool) {
        self.fail_aggregations.store(fail, Ordering::SeqCst);
    }

    fn begin(&self, op: &str, collection: &str) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        debug!(op, collection, "memory store request");
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::Driver("memory store is unavailable".to_string()));
        }
        Ok(())
    }

    /// Raw BM25 score per matching record, in insertion order.
    fn bm25_scores<'a>(
        collection: &'a Collection,
        query: &str,
        fields: &[&str],
        filter: Option<&'a Filter>,
    ) -> Vec<(&'a Record, f32)> {
        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let docs: Vec<(&Record, Vec<String>)> = collection
            .filtered(filter)
            .map(|r| (r, tokenize(&field_text(&r.properties, fields))))
            .collect();
        if docs.is_empty() {
            return Vec::new();
        }

        let n = docs.len() as f32;
        let avgdl = (docs.iter().map(|(_, t)| t.len()).sum::<usize>() as f32 / n).max(1.0);

        let idf: HashMap<&str, f32> = query_terms
            .iter()
            .map(|term| {
                let df = docs.iter().filter(|(_, t)| t.contains(term)).count() as f32;
                (term.as_str(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        docs.iter()
            .filter_map(|(record, tokens)| {
                let dl = tokens.len() as f32;
                let score: f32 = query_terms
                    .iter()
                    .map(|term| {
                        let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        idf[term.as_str()] * tf * (BM25_K1 + 1.0)
                            / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl))
                    })
                    .sum();
                (score > 0.0).then_some((*record, score))
            })
            .collect()
    }
}

/// Concatenate the string form of `fields` for full-text scoring.
fn field_text(properties: &Map<String, Value>, fields: &[&str]) -> String {
    fields
        .iter()
        .filter_map(|f| properties.get(*f))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sort by descending score; ties keep insertion order.
fn rank(mut scored: Vec<(&Record, f32)>, limit: usize) -> Vec<StoredObject> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .into_iter()
        .take(limit)
        .map(|(r, s)| r.to_stored(Some(s)))
        .collect()
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn insert_batch(
        &self,
        collection: &str,
        objects: Vec<NewObject>,
    ) -> Result<Vec<InsertOutcome>> {
        self.begin("insert_batch", collection)?;
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        let outcomes = objects
            .into_iter()
            .map(|object| -> InsertOutcome {
                coll.check_vector(object.vector.as_ref())?;
                if coll.dim.is_none() {
                    coll.dim = object.vector.as_ref().map(Vec::len);
                }
                let handle = ObjectHandle(Uuid::new_v4());
                coll.records.push(Record {
                    handle,
                    properties: object.properties,
                    vector: object.vector,
                });
                Ok(handle)
            })
            .collect();
        Ok(outcomes)
    }

    async fn fetch(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredObject>> {
        self.begin("fetch", collection)?;
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(coll
            .filtered(filter)
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| r.to_stored(None))
            .collect())
    }

    async fn near_vector(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<StoredObject>> {
        self.begin("near_vector", collection)?;
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let scored = coll
            .filtered(filter)
            .filter_map(|r| {
                let v = r.vector.as_ref()?;
                (v.len() == vector.len())
                    .then(|| (r, cosine_to_certainty(cosine_similarity(v, vector))))
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn bm25(
        &self,
        collection: &str,
        query: &str,
        fields: &[&str],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<StoredObject>> {
        self.begin("bm25", collection)?;
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(rank(Self::bm25_scores(coll, query, fields, filter), limit))
    }

    async fn hybrid(
        &self,
        collection: &str,
        query: &str,
        vector: &[f32],
        alpha: f32,
        fields: &[&str],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<StoredObject>> {
        self.begin("hybrid", collection)?;
        let alpha = alpha.clamp(0.0, 1.0);
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let keyword: HashMap<ObjectHandle, f32> = Self::bm25_scores(coll, query, fields, filter)
            .into_iter()
            .map(|(r, s)| (r.handle, s))
            .collect();
        let max_keyword = keyword.values().copied().fold(0.0_f32, f32::max);

        let scored = coll
            .filtered(filter)
            .filter_map(|r| {
                let vector_score = r
                    .vector
                    .as_ref()
                    .filter(|v| v.len() == vector.len())
                    .map(|v| cosine_to_certainty(cosine_similarity(v, vector)));
                let keyword_score = keyword
                    .get(&r.handle)
                    .map(|s| if max_keyword > 0.0 { s / max_keyword } else { 0.0 });
                if vector_score.is_none() && keyword_score.is_none() {
                    return None;
                }
                let fused = alpha * vector_score.unwrap_or(0.0)
                    + (1.0 - alpha) * keyword_score.unwrap_or(0.0);
                Some((r, fused))
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn update(&self, collection: &str, handle: ObjectHandle, object: NewObject) -> Result<()> {
        self.begin("update", collection)?;
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| GraphError::Driver(format!("unknown collection {collection}")))?;
        coll.check_vector(object.vector.as_ref()).map_err(GraphError::Driver)?;
        if coll.dim.is_none() {
            coll.dim = object.vector.as_ref().map(Vec::len);
        }
        let record = coll
            .records
            .iter_mut()
            .find(|r| r.handle == handle)
            .ok_or_else(|| GraphError::Driver(format!("object {handle} not found in {collection}")))?;
        record.properties = object.properties;
        record.vector = object.vector;
        Ok(())
    }

    async fn delete(&self, collection: &str, handle: ObjectHandle) -> Result<()> {
        self.begin("delete", collection)?;
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| GraphError::Driver(format!("unknown collection {collection}")))?;
        let before = coll.records.len();
        coll.records.retain(|r| r.handle != handle);
        if coll.records.len() == before {
            return Err(GraphError::Driver(format!("object {handle} not found in {collection}")));
        }
        Ok(())
    }

    async fn aggregate_group_by(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<GroupCount>> {
        self.begin("aggregate_group_by", collection)?;
        if self.fail_aggregations.load(Ordering::SeqCst) {
            return Err(GraphError::Driver("aggregation is unavailable".to_string()));
        }
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in coll.filtered(filter) {
            let value = match record.properties.get(field) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::String(_)) | Some(Value::Null) | None => continue,
                Some(other) => other.to_string(),
            };
            *counts.entry(value).or_default() += 1;
        }

        let mut groups: Vec<GroupCount> = counts
            .into_iter()
            .map(|(value, count)| GroupCount { value, count })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Ok(groups)
    }
}
