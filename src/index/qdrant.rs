//! Qdrant REST backend for [`VectorIndex`].
//!
//! Each chunk becomes one point whose id is the chunk index and whose
//! payload is `{text, chunk_index}`. Requests carry the `api-key` header
//! when a key is configured.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use redline_core::index::{Distance, IndexError, VectorIndex};
use redline_core::models::{Chunk, SearchHit};

pub struct QdrantIndex {
    http: reqwest::Client,
    base_url: String,
    dims: usize,
    distance: Distance,
}

#[derive(Serialize)]
struct Point<'a> {
    id: u64,
    vector: &'a [f32],
    payload: PointPayload<'a>,
}

#[derive(Serialize)]
struct PointPayload<'a> {
    text: &'a str,
    chunk_index: usize,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchEntry>,
}

#[derive(Deserialize)]
struct SearchEntry {
    id: serde_json::Value,
    score: f32,
    payload: Option<StoredPayload>,
}

#[derive(Deserialize)]
struct StoredPayload {
    #[serde(default)]
    text: String,
    chunk_index: Option<usize>,
}

impl QdrantIndex {
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        dims: usize,
        distance: Distance,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert(HeaderName::from_static("api-key"), HeaderValue::from_str(key)?);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            dims,
            distance,
        })
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.base_url, name)
    }

    fn check_dims(&self, collection: &str, got: usize) -> Result<(), IndexError> {
        if got != self.dims {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: self.dims,
                got,
            });
        }
        Ok(())
    }
}

fn backend(context: &str, e: impl std::fmt::Display) -> IndexError {
    IndexError::Backend(format!("{}: {}", context, e))
}

async fn failure(context: &str, response: reqwest::Response) -> IndexError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    IndexError::Backend(format!("{} ({}): {}", context, status, body))
}

/// Parse a point id back into a chunk index when the payload lacks one.
fn id_as_index(id: &serde_json::Value) -> Option<usize> {
    id.as_u64().map(|i| i as usize)
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn recreate_collection(&self, name: &str) -> Result<(), IndexError> {
        self.drop_collection(name).await?;

        let body = serde_json::json!({
            "vectors": {
                "size": self.dims,
                "distance": self.distance.as_str(),
            }
        });
        let response = self
            .http
            .put(self.collection_url(name))
            .json(&body)
            .send()
            .await
            .map_err(|e| backend("qdrant create collection", e))?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::debug!(collection = name, dims = self.dims, "qdrant collection created");
                Ok(())
            }
            _ => Err(failure("qdrant create collection failed", response).await),
        }
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        for c in chunks {
            self.check_dims(collection, c.embedding.len())?;
        }
        let points: Vec<Point<'_>> = chunks
            .iter()
            .map(|c| Point {
                id: c.index as u64,
                vector: &c.embedding,
                payload: PointPayload {
                    text: &c.text,
                    chunk_index: c.index,
                },
            })
            .collect();

        let response = self
            .http
            .put(format!("{}/points", self.collection_url(collection)))
            .query(&[("wait", "true")])
            .json(&serde_json::json!({ "points": points }))
            .send()
            .await
            .map_err(|e| backend("qdrant upsert", e))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(IndexError::UnknownCollection(collection.to_string())),
            _ => Err(failure("qdrant upsert failed", response).await),
        }
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dims(collection, query.len())?;
        let body = SearchRequest {
            vector: query,
            limit: k,
            with_payload: true,
        };
        let response = self
            .http
            .post(format!("{}/points/search", self.collection_url(collection)))
            .json(&body)
            .send()
            .await
            .map_err(|e| backend("qdrant search", e))?;
        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(IndexError::UnknownCollection(collection.to_string()))
            }
            _ => return Err(failure("qdrant search failed", response).await),
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| backend("qdrant search response", e))?;
        let mut hits: Vec<SearchHit> = parsed
            .result
            .into_iter()
            .map(|entry| {
                let (text, payload_index) = match entry.payload {
                    Some(p) => (p.text, p.chunk_index),
                    None => (String::new(), None),
                };
                SearchHit {
                    index: payload_index.or_else(|| id_as_index(&entry.id)).unwrap_or(0),
                    text,
                    score: entry.score,
                }
            })
            .collect();
        // Qdrant already orders by score; re-sort so ties follow chunk order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        let response = self
            .http
            .delete(self.collection_url(name))
            .send()
            .await
            .map_err(|e| backend("qdrant delete collection", e))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(failure("qdrant delete collection failed", response).await),
        }
    }
}
