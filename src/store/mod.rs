//! Named vector collections.
//!
//! [`CollectionStore`] is the seam between the service and the storage backend. Two backends
//! exist: [`LocalStore`], which keeps each collection as a JSON-lines file under a persistence
//! root, and [`QdrantStore`], which talks to a Qdrant server over HTTP.

pub mod local;
pub mod qdrant;
pub mod types;

pub use local::LocalStore;
pub use qdrant::QdrantStore;
pub use types::{ScoredSegment, StoreError, VectorRecord};

use crate::config::{Config, VectorStoreBackend};
use crate::sanitize::CollectionName;
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the service needs from a vector store.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Names of every collection currently stored.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Whether `name` is among [`CollectionStore::list_collections`].
    async fn exists(&self, name: &CollectionName) -> Result<bool, StoreError> {
        let collections = self.list_collections().await?;
        Ok(collections.iter().any(|existing| existing == name.as_str()))
    }

    /// Create `name` seeded with `records`. Fails if the collection already exists.
    async fn create_from(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError>;

    /// Add `records` to the existing collection `name`, leaving prior records untouched.
    async fn append_to(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError>;

    /// Make sure `name` exists, creating it empty when missing.
    async fn open_or_create(&self, name: &CollectionName) -> Result<(), StoreError>;

    /// Return up to `limit` records most similar to `query`, best first.
    async fn search(
        &self,
        name: &CollectionName,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredSegment>, StoreError>;

    /// Number of records held by `name`.
    async fn count(&self, name: &CollectionName) -> Result<usize, StoreError>;
}

/// Build the store selected by configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn CollectionStore>, StoreError> {
    match config.vector_store {
        VectorStoreBackend::Local => {
            tracing::info!(root = %config.persist_directory.display(), "Using local vector store");
            Ok(Arc::new(LocalStore::new(config.persist_directory.clone())))
        }
        VectorStoreBackend::Qdrant => {
            let url = config
                .qdrant_url
                .as_deref()
                .ok_or_else(|| StoreError::InvalidUrl("QDRANT_URL is not set".into()))?;
            tracing::info!(url, "Using Qdrant vector store");
            Ok(Arc::new(QdrantStore::new(
                url,
                config.qdrant_api_key.clone(),
                config.embedding_dimension,
            )?))
        }
    }
}
