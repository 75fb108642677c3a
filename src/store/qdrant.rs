//! Collection store backed by a Qdrant server.

use super::CollectionStore;
use super::types::{ScoredSegment, StoreError, VectorRecord};
use crate::document::{DocumentSegment, SegmentMetadata};
use crate::sanitize::CollectionName;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// HTTP client storing collections in Qdrant.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    vector_size: usize,
}

impl QdrantStore {
    /// Construct a client for the Qdrant instance at `url`.
    ///
    /// Collections created through this store use `vector_size` dimensions and cosine distance.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("pdfchat/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            vector_size,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = StoreError::UnexpectedStatus { status, body };
        tracing::error!(error = %error, "{context}");
        Err(error)
    }

    async fn collection_exists(&self, name: &CollectionName) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.ensure_success(response, "Collection existence check failed")
            .await?;
        Ok(true)
    }

    async fn create_collection(&self, name: &CollectionName) -> Result<(), StoreError> {
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{name}"))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response, "Failed to create collection")
            .await?;
        tracing::debug!(collection = %name, vector_size = self.vector_size, "Collection created");
        Ok(())
    }

    async fn upsert(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let count = records.len();
        let points: Vec<Value> = records
            .into_iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.vector,
                    "payload": {
                        "text": record.text,
                        "source": record.metadata.source,
                        "page": record.metadata.page,
                        "indexed_at": record.indexed_at,
                    }
                })
            })
            .collect();

        let response = self
            .request(Method::PUT, &format!("collections/{name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        self.ensure_success(response, "Failed to upsert points")
            .await?;
        tracing::debug!(collection = %name, points = count, "Points upserted");
        Ok(count)
    }
}

#[async_trait]
impl CollectionStore for QdrantStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self.request(Method::GET, "collections").send().await?;
        let response = self
            .ensure_success(response, "Failed to list collections")
            .await?;
        let payload: ListCollectionsResponse = response.json().await?;
        Ok(payload
            .result
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    async fn create_from(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        if self.collection_exists(name).await? {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        self.create_collection(name).await?;
        self.upsert(name, records).await
    }

    async fn append_to(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        if !self.collection_exists(name).await? {
            return Err(StoreError::MissingCollection(name.to_string()));
        }
        self.upsert(name, records).await
    }

    async fn open_or_create(&self, name: &CollectionName) -> Result<(), StoreError> {
        if self.collection_exists(name).await? {
            return Ok(());
        }
        self.create_collection(name).await
    }

    async fn search(
        &self,
        name: &CollectionName,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredSegment>, StoreError> {
        let body = json!({
            "query": query,
            "limit": limit,
            "with_payload": true,
        });
        let response = self
            .request(Method::POST, &format!("collections/{name}/points/query"))
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response, "Qdrant search failed").await?;

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredSegment {
                segment: segment_from_payload(point.payload.unwrap_or_default()),
                score: point.score,
            })
            .collect())
    }

    async fn count(&self, name: &CollectionName) -> Result<usize, StoreError> {
        let response = self
            .request(Method::POST, &format!("collections/{name}/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::MissingCollection(name.to_string()));
        }
        let response = self
            .ensure_success(response, "Failed to count points")
            .await?;
        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }
}

fn segment_from_payload(payload: Map<String, Value>) -> DocumentSegment {
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let source = payload
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let page = payload
        .get("page")
        .and_then(Value::as_u64)
        .and_then(|page| u32::try_from(page).ok())
        .unwrap_or_default();
    DocumentSegment {
        text,
        metadata: SegmentMetadata { source, page },
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[derive(Deserialize)]
struct ListCollectionsResponse {
    result: ListCollectionsResult,
}

#[derive(Deserialize)]
struct ListCollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}
