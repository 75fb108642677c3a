//! Embedding client abstraction and the Google Generative Language adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of texts the provider accepts in one batch request.
const MAX_BATCH_SIZE: usize = 100;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// HTTP layer failed before receiving a response.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with a non-success status.
    #[error("Embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a different number of vectors than texts submitted.
    #[error("Embedding provider returned {actual} vectors for {expected} texts")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one vector per document text, in input order.
    async fn embed_documents(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Produce the vector used to search for `text`.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError>;
}

/// Embedding client backed by the Google Generative Language API.
pub struct GeminiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbeddingClient {
    /// Build a client for `model`, authenticating with `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: &str,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder().user_agent("pdfchat/embedding").build()?;
        let model = qualified_model(model);
        tracing::debug!(model = %model, "Initialized embedding client");
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/{}:{method}",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn content_request<'a>(
        &'a self,
        text: &'a str,
        task_type: TaskType,
    ) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: vec![Part { text }],
            },
            task_type,
        }
    }

    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R, EmbeddingClientError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(self.endpoint(method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingClientError::UnexpectedStatus { status, body };
            tracing::error!(model = %self.model, error = %error, "Embedding request failed");
            return Err(error);
        }

        Ok(response.json().await?)
    }
}

/// Prefix bare model ids with `models/`, as the REST paths expect.
fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn embed_documents(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.content_request(text, TaskType::RetrievalDocument))
                    .collect(),
            };
            let response: BatchEmbedResponse = self.post("batchEmbedContents", &request).await?;
            if response.embeddings.len() != batch.len() {
                return Err(EmbeddingClientError::CountMismatch {
                    expected: batch.len(),
                    actual: response.embeddings.len(),
                });
            }
            vectors.extend(response.embeddings.into_iter().map(|e| e.values));
        }
        tracing::debug!(model = %self.model, vectors = vectors.len(), "Embedded documents");
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let request = self.content_request(text, TaskType::RetrievalQuery);
        let response: EmbedContentResponse = self.post("embedContent", &request).await?;
        Ok(response.embedding.values)
    }
}
