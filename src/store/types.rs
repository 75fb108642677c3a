//! Records, search hits, and errors shared by the store backends.

use crate::document::{DocumentSegment, SegmentMetadata};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors returned by collection stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation on the persistence root failed.
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record could not be encoded or decoded.
    #[error("Corrupt record in collection '{collection}': {source}")]
    Corrupt {
        /// Collection holding the record.
        collection: String,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
    /// `create_from` targeted a collection that already exists.
    #[error("Collection '{0}' already exists")]
    AlreadyExists(String),
    /// `append_to`, `search`, or `count` targeted a missing collection.
    #[error("Collection '{0}' does not exist")]
    MissingCollection(String),
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// A stored embedding plus the segment it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Identifier assigned at creation.
    pub id: String,
    /// Embedding of [`VectorRecord::text`].
    pub vector: Vec<f32>,
    /// Segment text, stored verbatim.
    pub text: String,
    /// Source metadata of the segment.
    pub metadata: SegmentMetadata,
    /// RFC 3339 creation timestamp.
    pub indexed_at: String,
}

impl VectorRecord {
    /// Pair a segment with its embedding under a fresh identifier.
    pub fn new(segment: DocumentSegment, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            text: segment.text,
            metadata: segment.metadata,
            indexed_at: current_timestamp_rfc3339(),
        }
    }

    /// The segment this record was built from.
    pub fn segment(&self) -> DocumentSegment {
        DocumentSegment {
            text: self.text.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSegment {
    /// Matched segment.
    pub segment: DocumentSegment,
    /// Similarity score; higher is closer.
    pub score: f32,
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Cosine similarity of two vectors; `None` when lengths differ or either is all zeros.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
