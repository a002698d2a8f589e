//! Error types for timerag
//!
//! This module provides the error taxonomy for schema construction, store access,
//! retrieval and answer generation.

use thiserror::Error;

/// Main error type for timerag operations
#[derive(Error, Debug)]
pub enum RagError {
    /// Schema created with a zero vector dimension
    #[error("Invalid dimension: {0} (must be greater than zero)")]
    InvalidDimension(usize),

    /// Schema created with a zero maximum text length
    #[error("Invalid maximum text length: {0} (must be greater than zero)")]
    InvalidLength(usize),

    /// Vector index build parameters out of range
    #[error("Invalid index parameters: {0}")]
    InvalidIndexParams(String),

    /// Record does not conform to the collection schema
    #[error("Invalid record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },

    /// Query parameters out of range
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Store location inaccessible or I/O failure on the store
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Unknown collection name
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection already exists with a different definition
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Primary key already present in the collection
    #[error("Duplicate record id '{id}' in collection '{collection}'")]
    DuplicateRecord { collection: String, id: String },

    /// Vector length differs from the collection dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Search returned nothing for the query and filter
    #[error("No relevant results found")]
    NoRelevantDataFound,

    /// Language model output is not valid structured data
    #[error("Malformed model output: {reason}")]
    MalformedOutput { reason: String, raw: String },

    /// Embedding collaborator errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Language model collaborator errors
    #[error("Language model error: {0}")]
    LanguageModel(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for timerag operations
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Whether a caller may reasonably retry the failed operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::StoreUnavailable(_) | RagError::Embedding(_) | RagError::LanguageModel(_)
        )
    }

    /// Whether this is the expected empty-retrieval outcome
    pub fn is_no_relevant_data(&self) -> bool {
        matches!(self, RagError::NoRelevantDataFound)
    }

    /// Raw model text preserved by a structured-output failure
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            RagError::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<async_openai::error::OpenAIError> for RagError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        RagError::LanguageModel(err.to_string())
    }
}

impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RagError::DimensionMismatch { expected: 3, actual: 2 };
        assert_eq!(error.to_string(), "Dimension mismatch: expected 3, got 2");
    }

    #[test]
    fn test_error_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let rag_error = RagError::from(io_error);

        match rag_error {
            RagError::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_retry_classification() {
        assert!(RagError::StoreUnavailable("down".to_string()).is_retryable());
        assert!(!RagError::NoRelevantDataFound.is_retryable());
        assert!(!RagError::CollectionNotFound("x".to_string()).is_retryable());
        assert!(RagError::NoRelevantDataFound.is_no_relevant_data());
    }

    #[test]
    fn test_malformed_output_keeps_raw_text() {
        let error = RagError::MalformedOutput {
            reason: "expected value".to_string(),
            raw: "not json".to_string(),
        };
        assert_eq!(error.raw_output(), Some("not json"));
        assert_eq!(RagError::NoRelevantDataFound.raw_output(), None);
    }
}
