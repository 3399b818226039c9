//! Vector similarity functions.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;

use crate::errors::GraphError;

/// Metric used when comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    DotProduct,
    /// Mapped to a similarity as `1 / (1 + distance)`.
    Euclidean,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::DotProduct => "dot",
            SimilarityMetric::Euclidean => "euclidean",
        }
    }

    /// Score `a` against `b` under this metric.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::DotProduct => dot_product(a, b),
            SimilarityMetric::Euclidean => {
                if a.is_empty() || a.len() != b.len() {
                    return 0.0;
                }
                1.0 / (1.0 + euclidean_distance(a, b))
            }
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "dot" | "dot_product" => Ok(SimilarityMetric::DotProduct),
            "euclidean" | "l2" => Ok(SimilarityMetric::Euclidean),
            other => Err(GraphError::InvalidArgument(format!(
                "unknown similarity metric '{other}'"
            ))),
        }
    }
}

/// Compute the cosine similarity between two f32 slices.
///
/// Returns `0.0` for empty slices, mismatched lengths, or zero vectors.
/// Returns a value in `[-1.0, 1.0]` for valid non-zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);

    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Plain dot product; `0.0` for empty or mismatched inputs.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    ArrayView1::from(a).dot(&ArrayView1::from(b))
}

/// Euclidean (L2) distance. Mismatched lengths yield `f32::INFINITY`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let diff = &ArrayView1::from(a) - &ArrayView1::from(b);
    diff.dot(&diff).sqrt()
}

/// Map a cosine similarity in `[-1, 1]` onto a certainty in `[0, 1]`.
pub fn cosine_to_certainty(cosine: f32) -> f32 {
    ((1.0 + cosine) / 2.0).clamp(0.0, 1.0)
}

/// L2-normalize a vector, returning a new `Vec<f32>`.
///
/// Returns a zero vector of the same length if the input is a zero vector.
/// Returns an empty `Vec` for empty input.
pub fn normalize_l2(v: &[f32]) -> Vec<f32> {
    if v.is_empty() {
        return Vec::new();
    }

    let arr = ArrayView1::from(v);
    let norm = arr.dot(&arr).sqrt();

    if norm == 0.0 {
        return vec![0.0; v.len()];
    }

    v.iter().map(|x| x / norm).collect()
}
