//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the storage seam for per-version chunk
//! collections, enabling pluggable backends (in-memory here, Qdrant in the
//! app crate). Each task writes into its own freshly recreated collections,
//! named by [`CollectionNaming`], so concurrent tasks never share one.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Chunk, SearchHit, Version};

/// Similarity metric used to rank search hits. Higher scores are better
/// under every metric (euclidean distance is negated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    /// Name used on the Qdrant wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }
}

/// Failure of a vector index operation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("collection not found: {0}")]
    UnknownCollection(String),
    #[error("vector dimension mismatch in {collection}: expected {expected}, got {got}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        got: usize,
    },
    #[error("vector index backend error: {0}")]
    Backend(String),
}

/// Abstract vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`recreate_collection`](VectorIndex::recreate_collection) | Drop (if present) and create an empty collection |
/// | [`upsert`](VectorIndex::upsert) | Bulk insert embedded chunks, keyed by chunk index |
/// | [`search`](VectorIndex::search) | Top-k nearest neighbours, best first |
/// | [`drop_collection`](VectorIndex::drop_collection) | Remove a collection (missing is not an error) |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored and query vector must have.
    fn dims(&self) -> usize;

    /// Drop any collection called `name` and create an empty one.
    async fn recreate_collection(&self, name: &str) -> Result<(), IndexError>;

    /// Insert chunks; an existing point with the same chunk index is replaced.
    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<(), IndexError>;

    /// Return up to `k` hits sorted by descending score.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Remove a collection.
    async fn drop_collection(&self, name: &str) -> Result<(), IndexError>;
}

/// Builds collection names of the form `<version-prefix><base>-<task-id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNaming {
    pub v1_prefix: String,
    pub v2_prefix: String,
}

impl Default for CollectionNaming {
    fn default() -> Self {
        Self {
            v1_prefix: "doc_v1_".to_string(),
            v2_prefix: "doc_v2_".to_string(),
        }
    }
}

impl CollectionNaming {
    pub fn prefix(&self, version: Version) -> &str {
        match version {
            Version::V1 => &self.v1_prefix,
            Version::V2 => &self.v2_prefix,
        }
    }

    /// Strip any leading version prefix from a caller-supplied document
    /// name, and replace characters that are unsafe in a URL path segment.
    pub fn clean_base_name(&self, base: &str) -> String {
        let mut name = base;
        for prefix in [&self.v1_prefix, &self.v2_prefix] {
            if !prefix.is_empty() {
                if let Some(rest) = name.strip_prefix(prefix.as_str()) {
                    name = rest;
                }
            }
        }
        name.chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Collection name for one version of one task's document.
    pub fn name(&self, version: Version, base: &str, task_id: &str) -> String {
        format!(
            "{}{}-{}",
            self.prefix(version),
            self.clean_base_name(base),
            task_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_has_prefix_and_task_suffix() {
        let naming = CollectionNaming::default();
        assert_eq!(
            naming.name(Version::V1, "contract", "task_abc"),
            "doc_v1_contract-task_abc"
        );
        assert_eq!(
            naming.name(Version::V2, "contract", "task_abc"),
            "doc_v2_contract-task_abc"
        );
    }

    #[test]
    fn test_existing_prefix_not_doubled() {
        let naming = CollectionNaming::default();
        assert_eq!(naming.clean_base_name("doc_v1_contract"), "contract");
        assert_eq!(naming.clean_base_name("doc_v2_contract"), "contract");
        assert_eq!(
            naming.name(Version::V2, "doc_v1_contract", "t1"),
            "doc_v2_contract-t1"
        );
    }

    #[test]
    fn test_unsafe_characters_replaced() {
        let naming = CollectionNaming::default();
        assert_eq!(naming.clean_base_name("my report/final?"), "my_report_final_");
    }

    #[test]
    fn test_same_document_distinct_tasks() {
        let naming = CollectionNaming::default();
        let a = naming.name(Version::V1, "memo", "task_1");
        let b = naming.name(Version::V1, "memo", "task_2");
        assert_ne!(a, b);
    }
}
