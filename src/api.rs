//! HTTP surface for the PDF chat service.
//!
//! - `POST /upload_pdf/` – multipart form with a `file` (PDF) and a `chat_id`. Extracts,
//!   embeds and stores the document, answering `{"message": "..."}`.
//! - `POST /chat/` – form fields `chat_id` and `message`, urlencoded or multipart. Answers
//!   `{"response": "..."}`.
//!
//! Both routes also match without the trailing slash. Failures answer `{"error": "..."}` with a
//! status chosen by [`ErrorStatusPolicy`].

use crate::config::{Config, ErrorStatusPolicy};
use crate::processing::{ChatApi, FailureKind, ServiceError};
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Router-level settings taken from configuration.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Origins allowed by CORS; `*` mirrors any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Status mapping for failures.
    pub error_status_policy: ErrorStatusPolicy,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
}

impl RouterOptions {
    /// Extract the router settings from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            cors_allowed_origins: config.cors_allowed_origins.clone(),
            error_status_policy: config.error_status_policy,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

struct AppState<S> {
    service: Arc<S>,
    policy: ErrorStatusPolicy,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            policy: self.policy,
        }
    }
}

/// Build the HTTP router exposing the upload and chat endpoints.
pub fn create_router<S>(service: Arc<S>, options: RouterOptions) -> Router
where
    S: ChatApi + 'static,
{
    let state = AppState {
        service,
        policy: options.error_status_policy,
    };
    Router::new()
        .route("/upload_pdf/", post(upload_pdf::<S>))
        .route("/upload_pdf", post(upload_pdf::<S>))
        .route("/chat/", post(chat::<S>))
        .route("/chat", post(chat::<S>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(cors_layer(&options.cors_allowed_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(
                        origin = %origin,
                        error = %err,
                        "Ignoring invalid CORS origin"
                    );
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Success response for `POST /upload_pdf/`.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
}

/// Success response for `POST /chat/`.
#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Store an uploaded PDF in the collection for `chat_id`.
async fn upload_pdf<S>(
    State(state): State<AppState<S>>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError>
where
    S: ChatApi,
{
    let mut form = read_form(request)
        .await
        .map_err(|message| ApiError::invalid_request(message, state.policy))?;
    let chat_id = form.require_text("chat_id", state.policy)?;
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::invalid_request("Missing form field 'file'", state.policy))?;

    let outcome = state
        .service
        .upload_pdf(&chat_id, file.content, file.file_name)
        .await
        .map_err(|error| ApiError::from_service(error, state.policy))?;

    tracing::info!(
        collection = %outcome.collection,
        segments = outcome.segments,
        created = outcome.created,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        message: format!(
            "✅ PDF processed and ready for chat. Chat ID: {}",
            outcome.collection
        ),
    }))
}

/// Answer a question against the collection for `chat_id`.
async fn chat<S>(
    State(state): State<AppState<S>>,
    request: Request,
) -> Result<Json<ChatResponse>, ApiError>
where
    S: ChatApi,
{
    let mut form = read_form(request)
        .await
        .map_err(|message| ApiError::invalid_request(message, state.policy))?;
    let chat_id = form.require_text("chat_id", state.policy)?;
    let message = form.require_text("message", state.policy)?;

    let response = state
        .service
        .chat(&chat_id, &message)
        .await
        .map_err(|error| ApiError::from_service(error, state.policy))?;
    Ok(Json(ChatResponse { response }))
}

struct UploadedFile {
    content: Vec<u8>,
    file_name: Option<String>,
}

#[derive(Default)]
struct FormFields {
    text: HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl FormFields {
    fn require_text(&mut self, name: &str, policy: ErrorStatusPolicy) -> Result<String, ApiError> {
        self.text.remove(name).ok_or_else(|| {
            ApiError::invalid_request(format!("Missing form field '{name}'"), policy)
        })
    }
}

/// Read a multipart or urlencoded form. The multipart field named `file` is kept as bytes.
async fn read_form(request: Request) -> Result<FormFields, String> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        let Form(text) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|rejection| rejection.body_text())?;
        return Ok(FormFields { text, file: None });
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| rejection.body_text())?;
    let mut fields = FormFields::default();
    while let Some(field) = multipart.next_field().await.map_err(|err| err.body_text())? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content = field.bytes().await.map_err(|err| err.body_text())?;
            fields.file = Some(UploadedFile {
                content: content.to_vec(),
                file_name,
            });
        } else {
            let value = field.text().await.map_err(|err| err.body_text())?;
            fields.text.insert(name, value);
        }
    }
    Ok(fields)
}

fn status_for(policy: ErrorStatusPolicy, kind: FailureKind) -> StatusCode {
    match policy {
        ErrorStatusPolicy::Uniform => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorStatusPolicy::Typed => match kind {
            FailureKind::Validation => StatusCode::BAD_REQUEST,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Upstream => StatusCode::BAD_GATEWAY,
            FailureKind::Storage | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    std::iter::successors(Some(error), |&err| err.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": caused by: ")
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_service(error: ServiceError, policy: ErrorStatusPolicy) -> Self {
        let kind = error.kind();
        tracing::error!(kind = ?kind, chain = %error_chain(&error), "Request failed");
        Self {
            status: status_for(policy, kind),
            message: error.to_string(),
        }
    }

    fn invalid_request(message: impl Into<String>, policy: ErrorStatusPolicy) -> Self {
        let message = message.into();
        tracing::warn!(%message, "Rejected malformed request");
        Self {
            status: status_for(policy, FailureKind::Validation),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatModelError;
    use crate::processing::UploadOutcome;
    use crate::sanitize::sanitize_chat_id;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdfchat-test-boundary";

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Upload {
            chat_id: String,
            content: Vec<u8>,
            file_name: Option<String>,
        },
        Chat {
            chat_id: String,
            question: String,
        },
    }

    #[derive(Clone, Copy)]
    enum Failure {
        None,
        Upstream,
        NotFound,
    }

    struct StubChatApi {
        calls: Mutex<Vec<Call>>,
        failure: Failure,
    }

    impl StubChatApi {
        fn new(failure: Failure) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                failure,
            })
        }

        fn fail(&self) -> Result<(), ServiceError> {
            match self.failure {
                Failure::None => Ok(()),
                Failure::Upstream => Err(ChatModelError::InvalidResponse("quota".into()).into()),
                Failure::NotFound => Err(ServiceError::CollectionNotFound("ghost".into())),
            }
        }
    }

    #[async_trait]
    impl ChatApi for StubChatApi {
        async fn upload_pdf(
            &self,
            chat_id: &str,
            content: Vec<u8>,
            file_name: Option<String>,
        ) -> Result<UploadOutcome, ServiceError> {
            self.calls.lock().await.push(Call::Upload {
                chat_id: chat_id.into(),
                content,
                file_name,
            });
            self.fail()?;
            Ok(UploadOutcome {
                collection: sanitize_chat_id(chat_id),
                segments: 2,
                created: true,
            })
        }

        async fn chat(&self, chat_id: &str, question: &str) -> Result<String, ServiceError> {
            self.calls.lock().await.push(Call::Chat {
                chat_id: chat_id.into(),
                question: question.into(),
            });
            self.fail()?;
            Ok(format!("answer to {question}"))
        }
    }

    fn options(policy: ErrorStatusPolicy) -> RouterOptions {
        RouterOptions {
            cors_allowed_origins: vec!["http://localhost:3000".into()],
            error_status_policy: policy,
            max_upload_bytes: 1024 * 1024,
        }
    }

    fn multipart_body(chat_id: &str, file: Option<&[u8]>) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chat_id\"\r\n\r\n{chat_id}\r\n"
        )
        .into_bytes();
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                     filename=\"notes.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn urlencoded_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn upload_route_accepts_multipart_pdf() {
        let service = StubChatApi::new(Failure::None);
        let app = create_router(service.clone(), options(ErrorStatusPolicy::Uniform));

        let response = app
            .oneshot(multipart_request(
                "/upload_pdf/",
                multipart_body("my chat", Some(b"%PDF-1.5 fake")),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(
            json["message"],
            "✅ PDF processed and ready for chat. Chat ID: my_chat"
        );
        let calls = service.calls.lock().await;
        assert_eq!(
            calls.as_slice(),
            &[Call::Upload {
                chat_id: "my chat".into(),
                content: b"%PDF-1.5 fake".to_vec(),
                file_name: Some("notes.pdf".into()),
            }]
        );
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let service = StubChatApi::new(Failure::None);
        let app = create_router(service.clone(), options(ErrorStatusPolicy::Typed));

        let response = app
            .oneshot(multipart_request("/upload_pdf", multipart_body("demo", None)))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Missing form field 'file'");
        assert!(service.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn chat_route_accepts_urlencoded_form() {
        let service = StubChatApi::new(Failure::None);
        let app = create_router(service.clone(), options(ErrorStatusPolicy::Uniform));

        let response = app
            .oneshot(urlencoded_request(
                "/chat/",
                "chat_id=demo&message=What+is+this%3F",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["response"], "answer to What is this?");
        let calls = service.calls.lock().await;
        assert_eq!(
            calls.as_slice(),
            &[Call::Chat {
                chat_id: "demo".into(),
                question: "What is this?".into(),
            }]
        );
    }

    #[tokio::test]
    async fn chat_route_accepts_multipart_without_trailing_slash() {
        let service = StubChatApi::new(Failure::None);
        let app = create_router(service, options(ErrorStatusPolicy::Uniform));
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chat_id\"\r\n\r\ndemo\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\nHi\r\n\
             --{BOUNDARY}--\r\n"
        );

        let response = app
            .oneshot(multipart_request("/chat", body.into_bytes()))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["response"], "answer to Hi");
    }

    #[tokio::test]
    async fn missing_message_field_is_reported() {
        let service = StubChatApi::new(Failure::None);
        let app = create_router(service.clone(), options(ErrorStatusPolicy::Uniform));

        let response = app
            .oneshot(urlencoded_request("/chat/", "chat_id=demo"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            "Missing form field 'message'"
        );
        assert!(service.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn uniform_policy_reports_failures_as_500() {
        let app = create_router(
            StubChatApi::new(Failure::Upstream),
            options(ErrorStatusPolicy::Uniform),
        );

        let response = app
            .oneshot(urlencoded_request("/chat/", "chat_id=demo&message=hi"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(
            json["error"],
            "Failed to generate answer: Malformed chat response: quota"
        );
    }

    #[tokio::test]
    async fn typed_policy_maps_failure_kinds() {
        let upstream = create_router(
            StubChatApi::new(Failure::Upstream),
            options(ErrorStatusPolicy::Typed),
        )
        .oneshot(urlencoded_request("/chat/", "chat_id=demo&message=hi"))
        .await
        .expect("router response");
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let missing = create_router(
            StubChatApi::new(Failure::NotFound),
            options(ErrorStatusPolicy::Typed),
        )
        .oneshot(urlencoded_request("/chat/", "chat_id=ghost&message=hi"))
        .await
        .expect("router response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(
            json_body(missing).await["error"]
                .as_str()
                .is_some_and(|message| message.contains("ghost"))
        );
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/chat/")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let app = create_router(
            StubChatApi::new(Failure::None),
            options(ErrorStatusPolicy::Uniform),
        );

        let response = app
            .oneshot(preflight("http://localhost:3000"))
            .await
            .expect("router response");

        let headers = response.headers();
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("http://localhost:3000")
        );
        assert_eq!(
            headers
                .get("access-control-allow-credentials")
                .and_then(|value| value.to_str().ok()),
            Some("true")
        );
        assert!(headers.contains_key("access-control-allow-methods"));
    }

    #[tokio::test]
    async fn cors_preflight_ignores_other_origins() {
        let app = create_router(
            StubChatApi::new(Failure::None),
            options(ErrorStatusPolicy::Uniform),
        );

        let response = app
            .oneshot(preflight("http://evil.example"))
            .await
            .expect("router response");

        assert!(!response.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn wildcard_origin_mirrors_request_origin() {
        let mut opts = options(ErrorStatusPolicy::Uniform);
        opts.cors_allowed_origins = vec!["*".into()];
        let app = create_router(StubChatApi::new(Failure::None), opts);

        let response = app
            .oneshot(preflight("http://anywhere.example"))
            .await
            .expect("router response");

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("http://anywhere.example")
        );
    }

    #[test]
    fn error_chain_lists_sources() {
        let error = ServiceError::from(ChatModelError::InvalidResponse("empty".into()));
        let chain = error_chain(&error);
        assert!(chain.starts_with("Failed to generate answer"));
        assert!(chain.ends_with("Malformed chat response: empty"));
    }
}
