//! Vector index for storing embedded chunks and searching them by similarity.
//!
//! [`FlatVectorIndex`] keeps every [`IndexEntry`] in insertion order behind a
//! `tokio::sync::RwLock` and answers queries with an exhaustive scan. Any
//! number of searches may run concurrently; `insert` and `save` take the
//! write lock and therefore exclude every other operation on the same index.
//!
//! Entries are append-only. There is no delete or update: rebuilding the index
//! from the corpus is the only way to remove content.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, IndexEntry, SearchResult};
use crate::error::{RagError, Result};
use crate::persist::{DirectoryIndexStore, IndexSnapshot, IndexStore};

/// The similarity measure shared by insertion and query.
///
/// Scores are always "higher is more similar".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine of the angle between vectors, in `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw dot product.
    InnerProduct,
    /// Negated Euclidean (L2) distance.
    Euclidean,
}

impl DistanceMetric {
    /// Score `candidate` against `query`.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(query, candidate),
            Self::InnerProduct => query.iter().zip(candidate).map(|(x, y)| x * y).sum(),
            Self::Euclidean => -query
                .iter()
                .zip(candidate)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// The result of a similarity search.
///
/// Searching an index with no entries is not an error, but it is reported
/// separately from a search that simply found nothing relevant.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The index holds no entries.
    EmptyIndex,
    /// Results ordered by descending score, earlier insertions first on ties.
    Matches(Vec<SearchResult>),
}

impl SearchOutcome {
    /// Whether the search ran against an empty index.
    pub fn is_empty_index(&self) -> bool {
        matches!(self, Self::EmptyIndex)
    }

    /// The ordered results; empty for [`SearchOutcome::EmptyIndex`].
    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            Self::EmptyIndex => Vec::new(),
            Self::Matches(results) => results,
        }
    }
}

/// A store of embedded chunks supporting k-nearest-neighbour search.
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::{FlatVectorIndex, VectorIndex};
///
/// let index = FlatVectorIndex::new(768);
/// let ids = index.insert(vec![(embedding, chunk)]).await?;
/// let outcome = index.search(&query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append entries and return their newly assigned vector IDs, in order.
    ///
    /// Either every entry is inserted or none is.
    async fn insert(&self, entries: Vec<(Vec<f32>, Chunk)>) -> Result<Vec<u64>>;

    /// Return up to `top_k` chunks most similar to `query`.
    ///
    /// Fails with [`RagError::DimensionMismatch`] if `query` has the wrong length.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<SearchOutcome>;

    /// Number of stored entries.
    async fn len(&self) -> usize;

    /// Whether the index has no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Dimensionality every stored vector shares.
    fn dimensions(&self) -> usize;

    /// The similarity metric applied to insert and search alike.
    fn metric(&self) -> DistanceMetric;
}

#[derive(Debug)]
struct FlatState {
    next_id: u64,
    entries: Vec<IndexEntry>,
}

/// An exhaustive-scan vector index held in memory.
#[derive(Debug)]
pub struct FlatVectorIndex {
    dimensions: usize,
    metric: DistanceMetric,
    state: RwLock<FlatState>,
}

impl FlatVectorIndex {
    /// Create an empty cosine-similarity index.
    pub fn new(dimensions: usize) -> Self {
        Self::with_metric(dimensions, DistanceMetric::Cosine)
    }

    /// Create an empty index using the given metric.
    pub fn with_metric(dimensions: usize, metric: DistanceMetric) -> Self {
        let state = FlatState { next_id: 0, entries: Vec::new() };
        Self { dimensions, metric, state: RwLock::new(state) }
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(RagError::DimensionMismatch { expected: self.dimensions, actual });
        }
        Ok(())
    }

    /// Persist the index through `store`.
    ///
    /// Holds the write lock for the duration, so no insert or search observes
    /// the index mid-save.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Persistence`] if the store fails.
    pub async fn save_to(&self, store: &dyn IndexStore) -> Result<()> {
        let state = self.state.write().await;
        let snapshot = IndexSnapshot {
            dimensions: self.dimensions,
            metric: self.metric,
            next_id: state.next_id,
            entries: state.entries.clone(),
        };
        store.save(&snapshot).await?;
        debug!(entries = snapshot.entries.len(), "saved vector index");
        Ok(())
    }

    /// Load an index previously written with [`save_to`](Self::save_to).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Persistence`] if the stored data is missing,
    /// malformed, or internally inconsistent. Nothing is returned on failure.
    pub async fn load_from(store: &dyn IndexStore) -> Result<Self> {
        let snapshot = store.load().await?;
        snapshot.validate()?;
        Ok(Self {
            dimensions: snapshot.dimensions,
            metric: snapshot.metric,
            state: RwLock::new(FlatState { next_id: snapshot.next_id, entries: snapshot.entries }),
        })
    }

    /// Load an index and require it to match the current embedder's dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the stored index was built
    /// with a different dimensionality, in addition to the errors of
    /// [`load_from`](Self::load_from).
    pub async fn load_expecting(store: &dyn IndexStore, dimensions: usize) -> Result<Self> {
        let index = Self::load_from(store).await?;
        if index.dimensions != dimensions {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: index.dimensions,
            });
        }
        Ok(index)
    }

    /// Save to a directory using the default on-disk layout.
    pub async fn save(&self, directory: impl Into<std::path::PathBuf>) -> Result<()> {
        self.save_to(&DirectoryIndexStore::new(directory)).await
    }

    /// Load from a directory written by [`save`](Self::save).
    pub async fn load(directory: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::load_from(&DirectoryIndexStore::new(directory)).await
    }
}

#[async_trait]
impl VectorIndex for FlatVectorIndex {
    async fn insert(&self, entries: Vec<(Vec<f32>, Chunk)>) -> Result<Vec<u64>> {
        for (vector, _) in &entries {
            self.check_dimensions(vector.len())?;
        }

        let mut state = self.state.write().await;
        let mut ids = Vec::with_capacity(entries.len());
        for (vector, chunk) in entries {
            let vector_id = state.next_id;
            state.next_id += 1;
            state.entries.push(IndexEntry { vector_id, vector, chunk });
            ids.push(vector_id);
        }
        Ok(ids)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<SearchOutcome> {
        self.check_dimensions(query.len())?;

        let state = self.state.read().await;
        if state.entries.is_empty() {
            return Ok(SearchOutcome::EmptyIndex);
        }

        let mut scored: Vec<SearchResult> = state
            .entries
            .iter()
            .map(|entry| {
                let score = self.metric.score(query, &entry.vector);
                let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
                SearchResult { chunk: entry.chunk.clone(), score }
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        Ok(SearchOutcome::Matches(scored))
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_ignores_magnitude() {
        let score = DistanceMetric::Cosine.score(&[1.0, 0.0], &[5.0, 0.0]);
        assert!((score - 1.0).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn euclidean_scores_closer_vectors_higher() {
        let near = DistanceMetric::Euclidean.score(&[0.0, 0.0], &[1.0, 0.0]);
        let far = DistanceMetric::Euclidean.score(&[0.0, 0.0], &[3.0, 4.0]);
        assert!(near > far);
        assert!((far + 5.0).abs() < 1e-6);
    }

    #[test]
    fn inner_product_is_dot() {
        assert_eq!(DistanceMetric::InnerProduct.score(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}
