//! Retrieval-augmented answering over a single collection.

use crate::document::DocumentSegment;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::llm::{ChatModel, ChatModelError, ChatRequest};
use crate::sanitize::CollectionName;
use crate::store::{CollectionStore, StoreError};
use thiserror::Error;

/// Number of segments retrieved per question when nothing else is configured.
pub const DEFAULT_TOP_K: usize = 4;

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at \
the end. If you don't know the answer, just say that you don't know, don't try to make up an \
answer.";

/// Failures while retrieving context or generating an answer.
#[derive(Debug, Error)]
pub enum RagError {
    /// The question could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The collection could not be opened or searched.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The chat model failed to answer.
    #[error(transparent)]
    Chat(#[from] ChatModelError),
}

/// Per-request view over one collection.
pub struct Retriever<'a> {
    store: &'a dyn CollectionStore,
    embedder: &'a dyn EmbeddingClient,
    collection: CollectionName,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    /// Open `collection`, creating it empty when it does not exist yet.
    pub async fn open(
        store: &'a dyn CollectionStore,
        embedder: &'a dyn EmbeddingClient,
        collection: CollectionName,
        top_k: usize,
    ) -> Result<Self, RagError> {
        store.open_or_create(&collection).await?;
        Ok(Self {
            store,
            embedder,
            collection,
            top_k,
        })
    }

    /// Collection this retriever searches.
    pub fn collection(&self) -> &CollectionName {
        &self.collection
    }

    /// Segments most similar to `question`, best first.
    pub async fn relevant_segments(
        &self,
        question: &str,
    ) -> Result<Vec<DocumentSegment>, RagError> {
        let query = self.embedder.embed_query(question).await?;
        let hits = self
            .store
            .search(&self.collection, &query, self.top_k)
            .await?;
        tracing::debug!(
            collection = %self.collection,
            top_k = self.top_k,
            hits = hits.len(),
            "Retrieved context segments"
        );
        Ok(hits.into_iter().map(|hit| hit.segment).collect())
    }
}

/// Compose the question-answering prompt with every segment stuffed into the context.
pub fn build_stuff_prompt(question: &str, segments: &[DocumentSegment]) -> String {
    let context = segments
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{PROMPT_PREAMBLE}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}

/// Answer `question` from the segments `retriever` finds.
pub async fn answer(
    question: &str,
    retriever: &Retriever<'_>,
    model: &dyn ChatModel,
    temperature: f32,
) -> Result<String, RagError> {
    let segments = retriever.relevant_segments(question).await?;
    let prompt = build_stuff_prompt(question, &segments);
    let response = model
        .generate(ChatRequest {
            prompt,
            temperature,
        })
        .await?;
    tracing::info!(
        collection = %retriever.collection(),
        segments = segments.len(),
        "Answer generated"
    );
    Ok(response)
}
