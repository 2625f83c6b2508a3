//! TOML configuration parsing.
//!
//! Every section is optional; a missing file means all defaults. See
//! `config/redline.example.toml` for a complete example.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use redline_core::embedding::RolePrefixes;
use redline_core::index::{CollectionNaming, Distance};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            document_prefix: default_document_prefix(),
            query_prefix: default_query_prefix(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn prefixes(&self) -> RolePrefixes {
        RolePrefixes {
            document: self.document_prefix.clone(),
            query: self.query_prefix.clone(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_document_prefix() -> String {
    RolePrefixes::default().document
}
fn default_query_prefix() -> String {
    RolePrefixes::default().query
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub distance: Distance,
    #[serde(default = "default_v1_prefix")]
    pub v1_prefix: String,
    #[serde(default = "default_v2_prefix")]
    pub v2_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: default_qdrant_url(),
            api_key: None,
            distance: Distance::default(),
            v1_prefix: default_v1_prefix(),
            v2_prefix: default_v2_prefix(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl IndexConfig {
    pub fn naming(&self) -> CollectionNaming {
        CollectionNaming {
            v1_prefix: self.v1_prefix.clone(),
            v2_prefix: self.v2_prefix.clone(),
        }
    }
}

fn default_index_backend() -> String {
    "memory".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_v1_prefix() -> String {
    CollectionNaming::default().v1_prefix
}
fn default_v2_prefix() -> String {
    CollectionNaming::default().v2_prefix
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Environment variable holding the bearer token, if any.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_llm_model() -> String {
    "Qwen/Qwen2.5-7B-Instruct".to_string()
}
fn default_llm_api_key_env() -> String {
    "VLLM_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            results_dir: default_results_dir(),
            retention_days: default_retention_days(),
        }
    }
}

impl StorageConfig {
    pub fn retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("./results")
}
fn default_retention_days() -> u64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on one `/analyze` request body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Seconds between retention sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

/// Load and validate the config at `path`. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    if config.analysis.top_k == 0 {
        anyhow::bail!("analysis.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() && config.embedding.provider != "local" {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.index.backend.as_str() {
        "memory" | "qdrant" => {}
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be memory or qdrant.",
            other
        ),
    }

    if config.index.v1_prefix == config.index.v2_prefix {
        anyhow::bail!("index.v1_prefix and index.v2_prefix must differ");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(s: &str) -> Config {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("");
        assert_eq!(config.chunking.size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.analysis.top_k, 10);
        assert_eq!(config.index.backend, "memory");
        assert_eq!(config.index.distance, Distance::Cosine);
        assert_eq!(config.embedding.document_prefix, "search_document: ");
        assert_eq!(config.embedding.query_prefix, "search_query: ");
        assert_eq!(config.storage.retention_days, 7);
        validate(&config).unwrap();
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse(
            r#"
[chunking]
size = 500
overlap = 50

[embedding]
provider = "openai"
model = "intfloat/multilingual-e5-base"
dims = 768
url = "http://tei:8080/v1"
document_prefix = "passage: "
query_prefix = "query: "

[index]
backend = "qdrant"
url = "http://qdrant:6333"
distance = "Dot"

[llm]
url = "http://vllm:8000/v1"
model = "Qwen/Qwen2.5-7B-Instruct"

[analysis]
top_k = 5

[server]
bind = "0.0.0.0:9000"
"#,
        );
        validate(&config).unwrap();
        assert_eq!(config.embedding.prefixes().query, "query: ");
        assert_eq!(config.index.distance, Distance::Dot);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse(include_str!("../config/redline.example.toml"));
        validate(&config).unwrap();
        assert_eq!(config.index.backend, "qdrant");
        assert_eq!(config.embedding.dims, Some(768));
        assert_eq!(config.server.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_overlap_must_be_below_size() {
        let config = parse("[chunking]\nsize = 100\noverlap = 100\n");
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_provider_requires_dims() {
        let config = parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n");
        assert!(validate(&config).unwrap_err().to_string().contains("dims"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config = parse("[index]\nbackend = \"faiss\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.chunking.size, 1000);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[chunking\nsize = ").unwrap();
        assert!(load_config(&path).is_err());
    }
}
