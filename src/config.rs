use std::env;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_CHAT_TEMPERATURE: f32 = 0.1;
const DEFAULT_RETRIEVER_TOP_K: usize = 4;
const DEFAULT_PERSIST_DIRECTORY: &str = "./db";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the pdfchat server.
///
/// Built once at startup and handed to the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the Google Generative Language API.
    pub google_api_key: String,
    /// Base URL of the Google Generative Language API.
    pub google_api_base_url: String,
    /// Embedding model identifier (`models/embedding-001` by default).
    pub embedding_model: String,
    /// Dimensionality of the vectors the embedding model produces.
    pub embedding_dimension: usize,
    /// Chat model identifier used for answering questions.
    pub chat_model: String,
    /// Sampling temperature passed to the chat model.
    pub chat_temperature: f32,
    /// Number of segments the retriever hands to the chat model.
    pub retriever_top_k: usize,
    /// Vector store backend holding the collections.
    pub vector_store: VectorStoreBackend,
    /// Root directory of the on-disk collection store.
    pub persist_directory: PathBuf,
    /// Base URL of the Qdrant instance (required for the Qdrant backend).
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Directory used for transient PDF files; the system default when unset.
    pub upload_temp_dir: Option<PathBuf>,
    /// Origins allowed to call the API from a browser.
    pub cors_allowed_origins: Vec<String>,
    /// Port the HTTP server binds to.
    pub server_port: u16,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
    /// How failures are mapped onto HTTP status codes.
    pub error_status_policy: ErrorStatusPolicy,
    /// Reject chat requests for conversations that have no collection yet.
    pub require_existing_collection: bool,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreBackend {
    /// File-backed collections under [`Config::persist_directory`].
    Local,
    /// Collections hosted by a Qdrant server.
    Qdrant,
}

/// Mapping from failures to HTTP status codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorStatusPolicy {
    /// Every failure is reported as `500 Internal Server Error`.
    #[default]
    Uniform,
    /// Failures map to a status matching their kind (400, 404, 502, 500).
    Typed,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, validating values along the way.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingVariable(key.into()));

        let vector_store = match get("VECTOR_STORE") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("VECTOR_STORE".into()))?,
            None => VectorStoreBackend::Local,
        };
        let qdrant_url = get("QDRANT_URL");
        if vector_store == VectorStoreBackend::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let chat_temperature =
            parse_or(get("CHAT_TEMPERATURE"), "CHAT_TEMPERATURE", DEFAULT_CHAT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&chat_temperature) {
            return Err(ConfigError::InvalidValue("CHAT_TEMPERATURE".into()));
        }
        let retriever_top_k =
            parse_or(get("RETRIEVER_TOP_K"), "RETRIEVER_TOP_K", DEFAULT_RETRIEVER_TOP_K)?;
        if retriever_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVER_TOP_K".into()));
        }
        let embedding_dimension = parse_or(
            get("EMBEDDING_DIMENSION"),
            "EMBEDDING_DIMENSION",
            DEFAULT_EMBEDDING_DIMENSION,
        )?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]);

        Ok(Self {
            google_api_key: require("GOOGLE_API_KEY")?,
            google_api_base_url: get("GOOGLE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_API_BASE_URL.into()),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            embedding_dimension,
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.into()),
            chat_temperature,
            retriever_top_k,
            vector_store,
            persist_directory: get("PERSIST_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSIST_DIRECTORY)),
            qdrant_url,
            qdrant_api_key: get("QDRANT_API_KEY"),
            upload_temp_dir: get("UPLOAD_TEMP_DIR").map(PathBuf::from),
            cors_allowed_origins,
            server_port: parse_or(get("SERVER_PORT"), "SERVER_PORT", DEFAULT_SERVER_PORT)?,
            max_upload_bytes: parse_or(
                get("MAX_UPLOAD_BYTES"),
                "MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            error_status_policy: match get("ERROR_STATUS_POLICY") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("ERROR_STATUS_POLICY".into()))?,
                None => ErrorStatusPolicy::default(),
            },
            require_existing_collection: parse_or(
                get("REQUIRE_EXISTING_COLLECTION"),
                "REQUIRE_EXISTING_COLLECTION",
                false,
            )?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

impl std::str::FromStr for VectorStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ErrorStatusPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "typed" => Ok(Self::Typed),
            _ => Err(()),
        }
    }
}

/// Load `.env` (when present) and build the configuration from the environment.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::info!(
        api_key_loaded = !config.google_api_key.is_empty(),
        "Google API key loaded"
    );
    tracing::debug!(
        embedding_model = %config.embedding_model,
        chat_model = %config.chat_model,
        vector_store = ?config.vector_store,
        persist_directory = %config.persist_directory.display(),
        server_port = config.server_port,
        error_status_policy = ?config.error_status_policy,
        "Loaded configuration"
    );
    Ok(config)
}
