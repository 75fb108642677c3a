//! Chat service coordinating extraction, embedding, storage, and answering.

use crate::{
    config::Config,
    document::PdfExtractor,
    embedding::{EmbeddingClient, GeminiEmbeddingClient},
    llm::{ChatModel, GeminiChatModel},
    processing::types::{ServiceError, UploadOutcome},
    rag::{self, Retriever},
    sanitize::sanitize_chat_id,
    store::{self, CollectionStore, StoreError, VectorRecord},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Abstraction over the chat pipeline used by the HTTP surface.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Extract, embed, and store a PDF under the collection derived from `chat_id`.
    async fn upload_pdf(
        &self,
        chat_id: &str,
        content: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<UploadOutcome, ServiceError>;

    /// Answer `question` from the documents uploaded for `chat_id`.
    async fn chat(&self, chat_id: &str, question: &str) -> Result<String, ServiceError>;
}

/// Owns the long-lived handles shared across requests.
///
/// Build once at startup and share through an `Arc`; retrievers are created per request.
pub struct ChatService {
    extractor: PdfExtractor,
    embedder: Box<dyn EmbeddingClient>,
    chat_model: Box<dyn ChatModel>,
    store: Arc<dyn CollectionStore>,
    top_k: usize,
    temperature: f32,
    require_existing_collection: bool,
}

impl ChatService {
    /// Assemble a service from already-built components.
    pub fn new(
        extractor: PdfExtractor,
        embedder: Box<dyn EmbeddingClient>,
        chat_model: Box<dyn ChatModel>,
        store: Arc<dyn CollectionStore>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            chat_model,
            store,
            top_k: rag::DEFAULT_TOP_K,
            temperature: 0.1,
            require_existing_collection: false,
        }
    }

    /// Override the number of segments retrieved per question.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Override the sampling temperature sent to the chat model.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Reject chats for collections that were never uploaded to.
    pub fn with_require_existing_collection(mut self, require: bool) -> Self {
        self.require_existing_collection = require;
        self
    }

    /// Build every component from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!(model = %config.embedding_model, "Initializing embedding client");
        let embedder = GeminiEmbeddingClient::new(
            config.google_api_base_url.clone(),
            config.google_api_key.clone(),
            &config.embedding_model,
        )?;
        tracing::info!(model = %config.chat_model, "Initializing chat model");
        let chat_model = GeminiChatModel::new(
            config.google_api_base_url.clone(),
            config.google_api_key.clone(),
            &config.chat_model,
        )?;
        let store = store::from_config(config)?;

        Ok(Self::new(
            PdfExtractor::new(config.upload_temp_dir.clone()),
            Box::new(embedder),
            Box::new(chat_model),
            store,
        )
        .with_top_k(config.retriever_top_k)
        .with_temperature(config.chat_temperature)
        .with_require_existing_collection(config.require_existing_collection))
    }
}

#[async_trait]
impl ChatApi for ChatService {
    async fn upload_pdf(
        &self,
        chat_id: &str,
        content: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<UploadOutcome, ServiceError> {
        let collection = sanitize_chat_id(chat_id);
        tracing::info!(
            collection = %collection,
            bytes = content.len(),
            file_name = file_name.as_deref().unwrap_or("<unnamed>"),
            "Processing PDF upload"
        );

        let segments = self.extractor.extract(content, file_name).await?;
        if segments.is_empty() {
            tracing::warn!(collection = %collection, "PDF produced no segments; nothing stored");
            return Ok(UploadOutcome {
                collection,
                segments: 0,
                created: false,
            });
        }

        let texts: Vec<String> = segments.iter().map(|segment| segment.text.clone()).collect();
        let vectors = self.embedder.embed_documents(texts).await?;
        let records: Vec<VectorRecord> = segments
            .into_iter()
            .zip(vectors)
            .map(|(segment, vector)| VectorRecord::new(segment, vector))
            .collect();

        let (stored, created) = if self.store.exists(&collection).await? {
            tracing::debug!(collection = %collection, "Appending to existing collection");
            (self.store.append_to(&collection, records).await?, false)
        } else {
            tracing::debug!(collection = %collection, "Creating collection");
            match self.store.create_from(&collection, records.clone()).await {
                Ok(stored) => (stored, true),
                // Another upload created it between the check and the write.
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!(collection = %collection, "Collection appeared; appending");
                    (self.store.append_to(&collection, records).await?, false)
                }
                Err(err) => return Err(err.into()),
            }
        };

        tracing::info!(
            collection = %collection,
            segments = stored,
            created,
            "PDF upload stored"
        );
        Ok(UploadOutcome {
            collection,
            segments: stored,
            created,
        })
    }

    async fn chat(&self, chat_id: &str, question: &str) -> Result<String, ServiceError> {
        let collection = sanitize_chat_id(chat_id);
        tracing::info!(collection = %collection, "Answering chat message");

        if self.require_existing_collection && !self.store.exists(&collection).await? {
            return Err(ServiceError::CollectionNotFound(collection.into_inner()));
        }

        let retriever = Retriever::open(
            self.store.as_ref(),
            self.embedder.as_ref(),
            collection,
            self.top_k,
        )
        .await?;
        let response =
            rag::answer(question, &retriever, self.chat_model.as_ref(), self.temperature).await?;
        Ok(response)
    }
}
