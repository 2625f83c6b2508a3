//! In-memory [`VectorIndex`] implementation for tests and single-process runs.
//!
//! Uses `HashMap` and `BTreeMap` behind `std::sync::RwLock` for thread
//! safety. Search is brute-force scoring over every point in the collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, dot_product, euclidean_distance};
use crate::models::{Chunk, SearchHit};

use super::{Distance, IndexError, VectorIndex};

struct StoredPoint {
    text: String,
    vector: Vec<f32>,
}

/// Points keyed by chunk index.
type Collection = BTreeMap<usize, StoredPoint>;

/// In-memory vector index.
pub struct InMemoryIndex {
    dims: usize,
    distance: Distance,
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new(dims: usize, distance: Distance) -> Self {
        Self {
            dims,
            distance,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Names of all live collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of points in a collection, if it exists.
    pub fn len(&self, name: &str) -> Option<usize> {
        self.collections.read().unwrap().get(name).map(|c| c.len())
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.distance {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Dot => dot_product(a, b),
            Distance::Euclid => -euclidean_distance(a, b),
        }
    }

    fn check_dims(&self, collection: &str, got: usize) -> Result<(), IndexError> {
        if self.dims != 0 && got != self.dims {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: self.dims,
                got,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn recreate_collection(&self, name: &str) -> Result<(), IndexError> {
        let mut collections = self.collections.write().unwrap();
        collections.insert(name.to_string(), Collection::new());
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<(), IndexError> {
        for c in chunks {
            self.check_dims(collection, c.embedding.len())?;
        }
        let mut collections = self.collections.write().unwrap();
        let points = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;
        for c in chunks {
            points.insert(
                c.index,
                StoredPoint {
                    text: c.text.clone(),
                    vector: c.embedding.clone(),
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dims(collection, query.len())?;
        let collections = self.collections.read().unwrap();
        let points = collections
            .get(collection)
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;

        let mut hits: Vec<SearchHit> = points
            .iter()
            .map(|(&index, p)| SearchHit {
                index,
                text: p.text.clone(),
                score: self.score(query, &p.vector),
            })
            .collect();
        // Stable: equal scores keep ascending chunk-index order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        self.collections.write().unwrap().remove(name);
        Ok(())
    }
}
