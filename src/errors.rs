//! Error types for graphrag-rs.

/// Alias for Results returning [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// Coarse error classes callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty id/query, out-of-range strength, bad configuration.
    InvalidArgument,
    /// Entity, relationship or path does not exist (in the resolved tenant).
    NotFound,
    /// An operation needs a collaborator that was not configured.
    CapabilityMissing,
    /// Backend, embedder or LLM call failed.
    UpstreamFailure,
    /// A payload could not be decoded.
    ParseFailure,
    /// Traversal depth above the supported maximum.
    MaxDepthExceeded,
    /// The request context was cancelled.
    Cancelled,
}

/// Top-level error type for graphrag-rs.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Missing required field: {field}")]
    MissingRequiredField { field: &'static str },

    #[error("Invalid strength {strength} for relationship {id}: must be within [0.0, 1.0]")]
    InvalidStrength { id: String, strength: f32 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Depth {depth} exceeds the maximum traversal depth of {max}")]
    MaxDepthExceeded { depth: usize, max: usize },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("No path between {source_id} and {target_id}")]
    PathNotFound { source_id: String, target_id: String },

    #[error("No embedder configured")]
    NoEmbedder,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Embedder error: {0}")]
    Embedder(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(#[source] Box<GraphError>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl GraphError {
    /// Classify this error into the coarse [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::InvalidId(_)
            | GraphError::MissingRequiredField { .. }
            | GraphError::InvalidStrength { .. }
            | GraphError::InvalidArgument(_)
            | GraphError::Validation(_) => ErrorKind::InvalidArgument,
            GraphError::MaxDepthExceeded { .. } => ErrorKind::MaxDepthExceeded,
            GraphError::EntityNotFound(_)
            | GraphError::RelationshipNotFound(_)
            | GraphError::PathNotFound { .. } => ErrorKind::NotFound,
            GraphError::NoEmbedder => ErrorKind::CapabilityMissing,
            GraphError::Driver(_)
            | GraphError::Embedder(_)
            | GraphError::Llm(_)
            | GraphError::ExtractionFailed(_) => ErrorKind::UpstreamFailure,
            GraphError::Serialization(_) => ErrorKind::ParseFailure,
            GraphError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// `true` for any of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// LLM-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited")]
    RateLimit,

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Authentication failed")]
    Authentication,

    #[error("API error: {message}")]
    Api { code: Option<String>, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_variants_are_invalid_argument() {
        assert_eq!(GraphError::InvalidId(String::new()).kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            GraphError::MissingRequiredField { field: "name" }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            GraphError::InvalidStrength { id: "r1".into(), strength: 1.5 }.kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn not_found_variants() {
        assert!(GraphError::EntityNotFound("e".into()).is_not_found());
        assert!(GraphError::RelationshipNotFound("r".into()).is_not_found());
        assert!(GraphError::PathNotFound { source_id: "a".into(), target_id: "b".into() }
            .is_not_found());
        assert!(!GraphError::Driver("boom".into()).is_not_found());
    }

    #[test]
    fn extraction_failure_keeps_its_cause() {
        let err = GraphError::ExtractionFailed(Box::new(GraphError::Llm(LlmError::RateLimit)));
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        let source = std::error::Error::source(&err).expect("has source");
        assert!(source.to_string().contains("Rate limited"));
    }

    #[test]
    fn strength_message_names_the_relationship() {
        let err = GraphError::InvalidStrength { id: "rel-9".into(), strength: 1.5 };
        assert!(err.to_string().contains("rel-9"));
        assert!(err.to_string().contains("1.5"));
    }
}
