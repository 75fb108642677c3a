//! Outcome and error types for the chat service.

use crate::document::ExtractionError;
use crate::embedding::EmbeddingClientError;
use crate::llm::ChatModelError;
use crate::rag::RagError;
use crate::sanitize::CollectionName;
use crate::store::StoreError;
use thiserror::Error;

/// Errors emitted by [`crate::processing::ChatService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The uploaded document could not be read.
    #[error("Failed to extract PDF text: {0}")]
    Extraction(#[from] ExtractionError),
    /// The embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The chat model failed.
    #[error("Failed to generate answer: {0}")]
    Chat(#[from] ChatModelError),
    /// The vector store failed.
    #[error("Vector store request failed: {0}")]
    Store(#[from] StoreError),
    /// Chat targeted a collection that was never uploaded to.
    #[error("No document has been uploaded for chat '{0}'")]
    CollectionNotFound(String),
}

impl From<RagError> for ServiceError {
    fn from(error: RagError) -> Self {
        match error {
            RagError::Embedding(inner) => Self::Embedding(inner),
            RagError::Store(inner) => Self::Store(inner),
            RagError::Chat(inner) => Self::Chat(inner),
        }
    }
}

/// Coarse classification used to pick an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request itself was unusable.
    Validation,
    /// The addressed resource does not exist.
    NotFound,
    /// A remote provider failed.
    Upstream,
    /// The vector store failed.
    Storage,
    /// Anything else.
    Internal,
}

impl ServiceError {
    /// Classify the error for status mapping.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Extraction(ExtractionError::Parse(_) | ExtractionError::Page { .. }) => {
                FailureKind::Validation
            }
            Self::Extraction(_) => FailureKind::Internal,
            Self::Embedding(_) | Self::Chat(_) => FailureKind::Upstream,
            Self::Store(_) => FailureKind::Storage,
            Self::CollectionNotFound(_) => FailureKind::NotFound,
        }
    }
}

/// Summary of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Collection the segments were written to.
    pub collection: CollectionName,
    /// Number of segments extracted and stored.
    pub segments: usize,
    /// Whether this upload created the collection.
    pub created: bool,
}
