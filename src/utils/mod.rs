//! Shared utilities.
//!
//! Includes:
//! - Timestamp encoding for backend records
//! - Vector similarity metrics
//! - Text helpers (tokenizing, label normalisation, JSON recovery from LLM output)

pub mod datetime;
pub mod similarity;
pub mod text;

pub use datetime::{format_timestamp, parse_flexible_datetime};
pub use similarity::{cosine_similarity, cosine_to_certainty, normalize_l2, SimilarityMetric};
pub use text::{
    extract_first_json_object, normalize_whitespace, to_upper_snake_case, tokenize,
    truncate_with_ellipsis,
};
