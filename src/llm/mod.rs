//! Chat-completion client used to answer questions.
//!
//! The Gemini adapter issues `generateContent` requests directly over HTTP, mirroring the
//! embedding adapter: one prompt in, one answer string out, no streaming.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum ChatModelError {
    /// HTTP layer failed before receiving a response.
    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with a non-success status.
    #[error("Chat provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider response carried no usable text.
    #[error("Malformed chat response: {0}")]
    InvalidResponse(String),
}

/// Prompt plus sampling settings sent to the model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Fully assembled prompt.
    pub prompt: String,
    /// Sampling temperature; lower is more deterministic.
    pub temperature: f32,
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a single answer for the request.
    async fn generate(&self, request: ChatRequest) -> Result<String, ChatModelError>;
}

/// Chat model backed by the Google Generative Language `generateContent` endpoint.
pub struct GeminiChatModel {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiChatModel {
    /// Build a client for `model`, authenticating with `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: &str,
    ) -> Result<Self, ChatModelError> {
        let http = Client::builder().user_agent("pdfchat/chat").build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.trim_start_matches("models/").to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, request: ChatRequest) -> Result<String, ChatModelError> {
        let payload = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ChatModelError::UnexpectedStatus { status, body };
            tracing::error!(model = %self.model, error = %error, "Chat request failed");
            return Err(error);
        }

        let body: GenerateContentResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| ChatModelError::InvalidResponse("no candidates returned".into()))?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        tracing::debug!(model = %self.model, chars = text.len(), "Chat response generated");
        Ok(text)
    }
}
