//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] - splits by character count with configurable overlap
//! - [`RecursiveChunker`] - prefers paragraph, line, sentence, then word
//!   boundaries inside each window, falling back to a hard split
//!
//! Both walk the text left to right, emit a chunk of at most `chunk_size`
//! characters, and start the next chunk `chunk_overlap` characters before the
//! previous one ended. No text is ever skipped, and emission stops as soon as
//! a chunk reaches the end of the document.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Boundaries tried by [`RecursiveChunker`], highest priority first.
const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text, offsets, and metadata.
/// Embeddings are computed later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Maximum number of characters per chunk.
    fn chunk_size(&self) -> usize;

    /// Maximum number of characters shared by consecutive chunks.
    fn chunk_overlap(&self) -> usize;
}

/// Split a document with the default boundary preferences.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`] unless `chunk_size > 0` and
/// `chunk_overlap < chunk_size`.
pub fn split(document: &Document, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    Ok(RecursiveChunker::new(chunk_size, chunk_overlap)?.chunk(document))
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfiguration(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfiguration(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `source` fields.
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = document.text.chars().collect();
        let spans = split_spans(&chars, self.chunk_size, self.chunk_overlap, &[]);
        build_chunks(document, &chars, spans)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Splits text at natural boundaries where possible: paragraphs → lines →
/// sentences → words → raw characters.
///
/// For each window of `chunk_size` characters the chunker looks for the last
/// occurrence of the highest-priority separator that still keeps the chunk
/// longer than both the overlap and half the window. The separator stays
/// attached to the end of the chunk. If no separator qualifies, the window is
/// split hard at `chunk_size`.
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1024, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Vec<char>>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with the default separators.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_separators(chunk_size, chunk_overlap, DEFAULT_SEPARATORS)
    }

    /// Create a `RecursiveChunker` with custom separators, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the sizes are invalid or
    /// any separator is empty.
    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &[&str],
    ) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        if separators.iter().any(|s| s.is_empty()) {
            return Err(RagError::InvalidConfiguration("separators must not be empty".to_string()));
        }
        let separators = separators.iter().map(|s| s.chars().collect()).collect();
        Ok(Self { chunk_size, chunk_overlap, separators })
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = document.text.chars().collect();
        let spans = split_spans(&chars, self.chunk_size, self.chunk_overlap, &self.separators);
        build_chunks(document, &chars, spans)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Compute `(start, end)` character spans covering `chars`.
///
/// Requires `chunk_size > 0` and `chunk_overlap < chunk_size`; both are
/// enforced by the chunker constructors.
fn split_spans(
    chars: &[char],
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[Vec<char>],
) -> Vec<(usize, usize)> {
    let total = chars.len();
    let mut spans = Vec::new();
    if total == 0 {
        return spans;
    }

    // A boundary must leave the chunk longer than this, so the next start
    // (`end - chunk_overlap`) always moves forward.
    let min_len = chunk_overlap.max(chunk_size / 2);
    let mut start = 0;

    loop {
        let hard_end = (start + chunk_size).min(total);
        let end = if hard_end == total {
            total
        } else {
            find_boundary(chars, start, hard_end, min_len, separators).unwrap_or(hard_end)
        };

        spans.push((start, end));
        if end == total {
            break;
        }
        start = end - chunk_overlap;
    }

    spans
}

/// Find the end position just after the last occurrence of the highest-priority
/// separator inside `(start + min_len, hard_end]`.
fn find_boundary(
    chars: &[char],
    start: usize,
    hard_end: usize,
    min_len: usize,
    separators: &[Vec<char>],
) -> Option<usize> {
    let lowest = start + min_len + 1;
    separators.iter().find_map(|separator| {
        (lowest..=hard_end).rev().find(|&end| {
            end >= start + separator.len() && chars[end - separator.len()..end] == separator[..]
        })
    })
}

fn build_chunks(document: &Document, chars: &[char], spans: Vec<(usize, usize)>) -> Vec<Chunk> {
    spans
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| {
            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), i.to_string());
            metadata.insert("source".to_string(), document.source_path.clone());
            Chunk {
                id: format!("{}_{i}", document.id),
                text: chars[start..end].iter().collect(),
                document_id: document.id.clone(),
                char_start: start,
                char_end: end,
                metadata,
            }
        })
        .collect()
}
