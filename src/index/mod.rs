//! Vector index backends.
//!
//! The trait and the in-memory backend live in `redline-core`; this module
//! adds the Qdrant REST backend and picks one from configuration.

pub mod qdrant;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use redline_core::index::memory::InMemoryIndex;
use redline_core::index::VectorIndex;

use crate::config::Config;

pub use qdrant::QdrantIndex;

/// Build the configured [`VectorIndex`].
///
/// | `index.backend` | Backend |
/// |-----------------|---------|
/// | `"memory"` | [`InMemoryIndex`] (process-local, lost on restart) |
/// | `"qdrant"` | [`QdrantIndex`] at `index.url` |
pub fn create_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let dims = config.embedding.dims.unwrap_or(0);
    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(dims, config.index.distance))),
        "qdrant" => {
            if dims == 0 {
                anyhow::bail!("index.backend = \"qdrant\" requires embedding.dims");
            }
            Ok(Arc::new(QdrantIndex::new(
                &config.index.url,
                config.index.api_key.as_deref(),
                dims,
                config.index.distance,
                Duration::from_secs(config.index.timeout_secs),
            )?))
        }
        other => anyhow::bail!("Unknown index backend: {}", other),
    }
}
