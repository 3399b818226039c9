//! Embedding-based entity deduplication.
//!
//! Greedy clustering: each entity is compared against the representatives
//! accepted so far and folded into the first one at or above the threshold.
//! Quadratic in the number of representatives, which stays small because
//! extraction caps the entity count.

use std::collections::HashMap;

use crate::nodes::Entity;
use crate::utils::cosine_similarity;

/// Survivors of a dedup pass plus the id remapping it implies.
#[derive(Debug, Clone, Default)]
pub struct Clustered {
    /// Representatives in first-seen order.
    pub entities: Vec<Entity>,
    /// Merged entity id -> representative id. Representatives are absent.
    pub merged_into: HashMap<String, String>,
}

impl Clustered {
    /// Representative id for `id` (itself when it was not merged).
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        self.merged_into.get(id).map(String::as_str).unwrap_or(id)
    }
}

/// Text embedded for dedup comparisons.
pub fn dedup_text(entity: &Entity) -> String {
    if entity.description.is_empty() {
        entity.name.clone()
    } else {
        format!("{} {}", entity.name, entity.description)
    }
}

/// Cluster `entities` whose embeddings reach `threshold` cosine similarity.
///
/// `embeddings[i]` belongs to `entities[i]`. Extra entities without an
/// embedding are kept as their own representatives.
pub fn cluster_entities(entities: Vec<Entity>, embeddings: &[Vec<f32>], threshold: f32) -> Clustered {
    let mut out = Clustered::default();
    // (index into out.entities, embedding index)
    let mut reps: Vec<(usize, usize)> = Vec::new();

    for (i, entity) in entities.into_iter().enumerate() {
        let Some(vector) = embeddings.get(i) else {
            out.entities.push(entity);
            continue;
        };
        let hit = reps
            .iter()
            .find(|(_, emb)| cosine_similarity(&embeddings[*emb], vector) >= threshold)
            .map(|(slot, _)| *slot);

        match hit {
            Some(slot) => {
                let rep = &mut out.entities[slot];
                out.merged_into.insert(entity.id.clone(), rep.id.clone());
                merge_into(rep, entity);
            }
            None => {
                reps.push((out.entities.len(), i));
                out.entities.push(entity);
            }
        }
    }
    out
}

/// Fold `other` into `rep`: longer name, longer description, property union
/// with `rep`'s keys winning.
fn merge_into(rep: &mut Entity, other: Entity) {
    if other.name.chars().count() > rep.name.chars().count() {
        rep.name = other.name;
    }
    if other.description.chars().count() > rep.description.chars().count() {
        rep.description = other.description;
    }
    for (key, value) in other.properties {
        rep.properties.entry(key).or_insert(value);
    }
}
