//! Persistence for vector indexes.
//!
//! [`DirectoryIndexStore`] lays an index out as two JSON files in one directory:
//!
//! - `vectors.json` - format version, dimensionality, metric, next vector ID,
//!   and every `(vector_id, vector)` pair
//! - `chunks.json` - a map from vector ID to [`Chunk`]
//!
//! Each file is written to a temporary sibling and renamed into place. Both
//! files carry the generation token of the save that wrote them; a load whose
//! files disagree on the token, or on the set of vector IDs, fails instead of
//! pairing vectors from one save with chunks from another.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{Chunk, IndexEntry};
use crate::error::{RagError, Result};
use crate::index::DistanceMetric;

const FORMAT_VERSION: u32 = 1;
const VECTORS_FILE: &str = "vectors.json";
const CHUNKS_FILE: &str = "chunks.json";

/// The complete state of an index, as exchanged with an [`IndexStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    /// Dimensionality shared by every vector.
    pub dimensions: usize,
    /// Metric the index was built with.
    pub metric: DistanceMetric,
    /// The ID the next inserted entry will receive.
    pub next_id: u64,
    /// Entries in insertion order.
    pub entries: Vec<IndexEntry>,
}

impl IndexSnapshot {
    /// Check internal consistency: vector lengths, unique ascending IDs below `next_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Persistence`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |message: String| RagError::Persistence {
            location: "snapshot".to_string(),
            message,
        };

        let mut previous: Option<u64> = None;
        for entry in &self.entries {
            if entry.vector.len() != self.dimensions {
                return Err(corrupt(format!(
                    "vector {} has {} dimensions, index has {}",
                    entry.vector_id,
                    entry.vector.len(),
                    self.dimensions
                )));
            }
            if previous.is_some_and(|p| entry.vector_id <= p) {
                return Err(corrupt(format!("vector id {} is out of order", entry.vector_id)));
            }
            if entry.vector_id >= self.next_id {
                return Err(corrupt(format!(
                    "vector id {} is not below next id {}",
                    entry.vector_id, self.next_id
                )));
            }
            previous = Some(entry.vector_id);
        }
        Ok(())
    }
}

/// A storage location that can hold one index snapshot.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Replace whatever is stored with `snapshot`.
    async fn save(&self, snapshot: &IndexSnapshot) -> Result<()>;

    /// Read back the stored snapshot.
    async fn load(&self) -> Result<IndexSnapshot>;
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorFile {
    format_version: u32,
    dimensions: usize,
    metric: DistanceMetric,
    next_id: u64,
    generation: Uuid,
    saved_at: DateTime<Utc>,
    vectors: Vec<StoredVector>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkFile<C> {
    generation: Uuid,
    chunks: BTreeMap<u64, C>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredVector {
    vector_id: u64,
    vector: Vec<f32>,
}

/// An [`IndexStore`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryIndexStore {
    directory: PathBuf,
}

impl DirectoryIndexStore {
    /// Use `directory` as the storage location. It is created on save if missing.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    /// The directory this store reads and writes.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn error(&self, message: impl Into<String>) -> RagError {
        RagError::Persistence {
            location: self.directory.display().to_string(),
            message: message.into(),
        }
    }

    async fn write_atomic(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let target = self.directory.join(name);
        let temporary = self.directory.join(format!(".{name}.tmp"));
        tokio::fs::write(&temporary, bytes)
            .await
            .map_err(|e| self.error(format!("failed to write {name}: {e}")))?;
        tokio::fs::rename(&temporary, &target)
            .await
            .map_err(|e| self.error(format!("failed to move {name} into place: {e}")))
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.directory.join(name))
            .await
            .map_err(|e| self.error(format!("failed to read {name}: {e}")))
    }
}

#[async_trait]
impl IndexStore for DirectoryIndexStore {
    async fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| self.error(format!("failed to create directory: {e}")))?;

        let generation = Uuid::new_v4();
        let vectors = VectorFile {
            format_version: FORMAT_VERSION,
            dimensions: snapshot.dimensions,
            metric: snapshot.metric,
            next_id: snapshot.next_id,
            generation,
            saved_at: Utc::now(),
            vectors: snapshot
                .entries
                .iter()
                .map(|e| StoredVector { vector_id: e.vector_id, vector: e.vector.clone() })
                .collect(),
        };
        let chunks = ChunkFile {
            generation,
            chunks: snapshot.entries.iter().map(|e| (e.vector_id, &e.chunk)).collect(),
        };

        let vectors_json = serde_json::to_vec(&vectors)
            .map_err(|e| self.error(format!("failed to encode vectors: {e}")))?;
        let chunks_json = serde_json::to_vec_pretty(&chunks)
            .map_err(|e| self.error(format!("failed to encode chunks: {e}")))?;

        self.write_atomic(CHUNKS_FILE, chunks_json).await?;
        self.write_atomic(VECTORS_FILE, vectors_json).await?;

        info!(
            location = %self.directory.display(),
            entries = snapshot.entries.len(),
            dimensions = snapshot.dimensions,
            %generation,
            "persisted vector index"
        );
        Ok(())
    }

    async fn load(&self) -> Result<IndexSnapshot> {
        let vectors: VectorFile = serde_json::from_slice(&self.read(VECTORS_FILE).await?)
            .map_err(|e| self.error(format!("malformed {VECTORS_FILE}: {e}")))?;
        if vectors.format_version != FORMAT_VERSION {
            return Err(self.error(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                vectors.format_version
            )));
        }

        let chunk_file: ChunkFile<Chunk> =
            serde_json::from_slice(&self.read(CHUNKS_FILE).await?)
                .map_err(|e| self.error(format!("malformed {CHUNKS_FILE}: {e}")))?;
        if chunk_file.generation != vectors.generation {
            return Err(self.error(format!(
                "{VECTORS_FILE} and {CHUNKS_FILE} come from different saves \
                 ({} vs {})",
                vectors.generation, chunk_file.generation
            )));
        }
        let mut chunks = chunk_file.chunks;

        let vector_ids: HashSet<u64> = vectors.vectors.iter().map(|v| v.vector_id).collect();
        if vector_ids.len() != vectors.vectors.len() {
            return Err(self.error("duplicate vector ids"));
        }
        if let Some(orphan) = chunks.keys().find(|id| !vector_ids.contains(*id)) {
            return Err(self.error(format!("chunk {orphan} has no vector")));
        }

        let mut entries = Vec::with_capacity(vectors.vectors.len());
        for stored in vectors.vectors {
            let chunk = chunks
                .remove(&stored.vector_id)
                .ok_or_else(|| self.error(format!("vector {} has no chunk", stored.vector_id)))?;
            entries.push(IndexEntry { vector_id: stored.vector_id, vector: stored.vector, chunk });
        }

        let snapshot = IndexSnapshot {
            dimensions: vectors.dimensions,
            metric: vectors.metric,
            next_id: vectors.next_id,
            entries,
        };
        snapshot.validate().map_err(|e| self.error(e.to_string()))?;

        debug!(
            location = %self.directory.display(),
            entries = snapshot.entries.len(),
            saved_at = %vectors.saved_at,
            "loaded vector index"
        );
        Ok(snapshot)
    }
}
