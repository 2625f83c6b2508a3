//! Embedding provider implementations.
//!
//! Concrete backends for the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]** — always fails; used when embeddings are not configured.
//! - **[`OpenAIProvider`]** — any OpenAI-compatible `/embeddings` endpoint
//!   (OpenAI, vLLM, text-embeddings-inference), with batching, retry and backoff.
//! - **[`OllamaProvider`]** — a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`** — on-device inference via fastembed
//!   (`--features local-embeddings`); no network calls after model download.
//!
//! Role prefixes are applied by [`redline_core::embedding::embed`] before
//! texts reach a provider.
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use redline_core::embedding::{EmbeddingError, EmbeddingProvider};

use crate::config::EmbeddingConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Model(
            "embedding provider is disabled; set [embedding].provider".to_string(),
        ))
    }
}

// ============ Shared HTTP plumbing ============

/// Settings shared by the HTTP-backed providers.
struct HttpSettings {
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `url`, retrying transient failures, and return the JSON reply.
    async fn post_json(
        &self,
        service: &str,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(service, attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(service, %status, "transient embedding API error");
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            service,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("{} API error {}: {}", service, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "{} connection error ({}): {}",
                        service,
                        url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", service)))
    }
}

fn model_error(e: anyhow::Error) -> EmbeddingError {
    EmbeddingError::Model(format!("{:#}", e))
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for OpenAI-compatible `POST {url}/embeddings` APIs.
///
/// Sends `Authorization: Bearer $OPENAI_API_KEY` when the variable is set,
/// so self-hosted servers without auth work unchanged.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: Option<String>,
    http: HttpSettings,
}

impl OpenAIProvider {
    /// Create a new provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            model,
            dims,
            url,
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            http: HttpSettings::new(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.url);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self
                .http
                .post_json("OpenAI", &url, self.api_key.as_deref(), &body)
                .await
                .map_err(model_error)?;
            out.extend(parse_openai_response(&json).map_err(model_error)?);
        }
        Ok(out)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by their `index` field
/// when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        embeddings.push((index, vec));
    }

    embeddings.sort_by_key(|(index, _)| *index);
    Ok(embeddings.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires Ollama to be running with an embedding model pulled.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    http: HttpSettings,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            model,
            dims,
            url,
            http: HttpSettings::new(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.url);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self
                .http
                .post_json("Ollama", &url, None, &body)
                .await
                .map_err(model_error)?;
            out.extend(parse_ollama_response(&json).map_err(model_error)?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for on-device inference via fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached; it is
/// loaded once when the provider is created and shared across tasks.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "multilingual-e5-base".to_string());
        let (fastembed_model, default_dims) = config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(default_dims);

        tracing::info!(model = %model_name, "loading local embedding model");
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Model("local embedding model lock poisoned".into()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbeddingError::Model(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Model(format!("local embedding task failed: {}", e)))?
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((fastembed::EmbeddingModel::MultilingualE5Large, 1024)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `--features local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
