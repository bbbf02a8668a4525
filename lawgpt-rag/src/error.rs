//! Error types for the `lawgpt-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval and generation operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking, retrieval, or pipeline parameters are inconsistent.
    ///
    /// Fatal: the caller must fix the configuration before retrying.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A single document could not be read or its text extracted.
    #[error("Document unreadable ({source_path}): {message}")]
    DocumentUnreadable {
        /// The storage path of the offending document.
        source_path: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding backend failed or was unreachable.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend failed or was unreachable.
    #[error("Generation unavailable ({provider}): {message}")]
    GenerationUnavailable {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector's length does not match the index dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality of the index.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// The vector index could not be searched.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Saving or loading a persisted index failed.
    #[error("Persistence error ({location}): {message}")]
    Persistence {
        /// The storage location involved.
        location: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Whether the failure is transient and worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EmbeddingUnavailable { .. } | Self::GenerationUnavailable { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
