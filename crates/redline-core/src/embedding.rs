//! Embedding provider trait, role prefixes and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, and the [`embed`] entry point the pipeline calls. Retrieval
//! models are asymmetric: documents and queries are encoded with different
//! textual prefixes, selected here by [`EmbeddingRole`]. Providers only ever
//! see already-prefixed text.
//!
//! Concrete provider implementations (OpenAI-compatible, Ollama, fastembed)
//! live in the `redline` app crate.

use async_trait::async_trait;
use thiserror::Error;

/// Which side of retrieval a text is being encoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingRole {
    /// Document chunks stored in a collection.
    Document,
    /// Comments used to query a collection.
    Query,
}

/// Textual prefixes prepended per role before vectorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePrefixes {
    pub document: String,
    pub query: String,
}

impl RolePrefixes {
    pub fn for_role(&self, role: EmbeddingRole) -> &str {
        match role {
            EmbeddingRole::Document => &self.document,
            EmbeddingRole::Query => &self.query,
        }
    }
}

impl Default for RolePrefixes {
    fn default() -> Self {
        Self {
            document: "search_document: ".to_string(),
            query: "search_query: ".to_string(),
        }
    }
}

/// Failure of an embedding call.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The underlying model or service raised.
    #[error("embedding model call failed: {0}")]
    Model(String),
    /// The provider returned a different number of vectors than inputs.
    #[error("embedding count mismatch: expected {expected}, got {got}")]
    CountMismatch { expected: usize, got: usize },
    /// A returned vector does not have the configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Trait for embedding providers.
///
/// `embed_batch` receives fully prefixed texts and must return one vector
/// per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"multilingual-e5-base"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Vectorize a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed `texts` for `role`, preserving order and count.
///
/// The role prefix is prepended here. Any provider failure, a count
/// mismatch, or a vector of the wrong dimensionality is an
/// [`EmbeddingError`]. An empty input returns an empty output without
/// calling the provider.
pub async fn embed(
    provider: &dyn EmbeddingProvider,
    prefixes: &RolePrefixes,
    texts: &[String],
    role: EmbeddingRole,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let prefix = prefixes.for_role(role);
    let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();

    let vectors = provider.embed_batch(&prefixed).await?;
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    let dims = provider.dims();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dims,
            got: bad.len(),
        });
    }
    Ok(vectors)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Dot product; `0.0` for mismatched lengths.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean distance; `f32::INFINITY` for mismatched lengths.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it was asked to embed; vector = [len, 1.0].
    struct RecordingProvider {
        seen: Mutex<Vec<String>>,
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn model_name(&self) -> &str {
            "recording"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.seen.lock().unwrap().extend(texts.iter().cloned());
            let mut out: Vec<Vec<f32>> = texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    fn provider(drop_last: bool) -> RecordingProvider {
        RecordingProvider {
            seen: Mutex::new(Vec::new()),
            drop_last,
        }
    }

    #[tokio::test]
    async fn test_embed_applies_role_prefix() {
        let p = provider(false);
        let prefixes = RolePrefixes::default();
        let texts = vec!["alpha".to_string(), "beta".to_string()];

        embed(&p, &prefixes, &texts, EmbeddingRole::Document).await.unwrap();
        embed(&p, &prefixes, &texts[..1], EmbeddingRole::Query).await.unwrap();

        let seen = p.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "search_document: alpha".to_string(),
                "search_document: beta".to_string(),
                "search_query: alpha".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_embed_preserves_order_and_count() {
        let p = provider(false);
        let texts: Vec<String> = ["a", "bbb", "cc"].iter().map(|s| s.to_string()).collect();
        let prefixes = RolePrefixes {
            document: String::new(),
            query: String::new(),
        };
        let vecs = embed(&p, &prefixes, &texts, EmbeddingRole::Document).await.unwrap();
        assert_eq!(vecs.len(), 3);
        assert_eq!(vecs[0][0], 1.0);
        assert_eq!(vecs[1][0], 3.0);
        assert_eq!(vecs[2][0], 2.0);
    }

    #[tokio::test]
    async fn test_embed_empty_skips_provider() {
        let p = provider(false);
        let vecs = embed(&p, &RolePrefixes::default(), &[], EmbeddingRole::Query)
            .await
            .unwrap();
        assert!(vecs.is_empty());
        assert!(p.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_error() {
        let p = provider(true);
        let texts = vec!["x".to_string(), "y".to_string()];
        let err = embed(&p, &RolePrefixes::default(), &texts, EmbeddingRole::Document)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::CountMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_euclidean() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(dot_product(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}
