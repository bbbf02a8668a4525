//! Data types for documents, chunks, index entries, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document containing text content and metadata.
///
/// Documents are created by a [`DocumentSource`](crate::source::DocumentSource)
/// and discarded once they have been chunked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The extracted text content of the document.
    pub text: String,
    /// The storage path the document was read from.
    pub source_path: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_path: source_path.into(),
            metadata: HashMap::new(),
        }
    }
}

/// A bounded contiguous slice of a [`Document`]'s text.
///
/// Offsets are measured in characters (Unicode scalar values), so
/// `char_end - char_start == text.chars().count()` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk (`{document_id}_{index}`).
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Character offset of the first character in the parent text.
    pub char_start: usize,
    /// Character offset one past the last character in the parent text.
    pub char_end: usize,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Number of characters covered by this chunk.
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// A stored vector together with the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Monotonically assigned identifier, unique within one index.
    pub vector_id: u64,
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// The chunk the vector represents.
    pub chunk: Chunk,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}
