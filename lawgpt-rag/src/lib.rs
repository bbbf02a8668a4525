//! # lawgpt-rag
//!
//! Retrieval-augmented question answering over a fixed legal-text corpus.
//!
//! ## Overview
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! vector index. A question is embedded, the most similar chunks are
//! retrieved, and a prompt combining those chunks with recent conversation
//! turns is sent to a language model. The answer is recorded in a bounded
//! per-session memory.
//!
//! - [`RecursiveChunker`] / [`FixedSizeChunker`] - character-based chunking with overlap
//! - [`FlatVectorIndex`] - exhaustive-scan index with directory persistence
//! - [`ConversationMemory`] / [`ChatSession`] - sliding-window history per conversation
//! - [`RagPipeline`] - ingest and answer orchestration
//! - [`EmbeddingProvider`], [`Generator`], [`DocumentSource`], [`IndexStore`] -
//!   collaborator seams, with offline implementations in [`mock`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lawgpt_rag::{
//!     ChatSession, DirectorySource, FlatVectorIndex, RagConfig, RagPipeline,
//!     mock::{MockEmbeddingProvider, MockGenerator},
//! };
//!
//! let embedder = Arc::new(MockEmbeddingProvider::new(256));
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(embedder)
//!     .vector_index(Arc::new(FlatVectorIndex::new(256)))
//!     .generator(Arc::new(MockGenerator::new()))
//!     .build()?;
//!
//! let report = pipeline.ingest_source(&DirectorySource::new("data", "*.txt")).await?;
//! let mut session = ChatSession::new(pipeline.config().memory_window);
//! let answer = pipeline.answer(&mut session, "What is the punishment for theft?").await?;
//! ```
//!
//! ## Features
//!
//! - `openai` - [`openai::OpenAIEmbeddingProvider`] and
//!   [`openai::OpenAIChatGenerator`] for OpenAI-compatible hosts (Together AI, OpenAI)

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod index;
pub mod memory;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
pub mod persist;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod session;
pub mod source;
pub mod stream;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, split};
pub use config::{GenerationConfig, RagConfig, RagConfigBuilder, RetryConfig};
pub use document::{Chunk, Document, IndexEntry, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generator::{Generator, TextStream};
pub use index::{DistanceMetric, FlatVectorIndex, SearchOutcome, VectorIndex};
pub use memory::{ConversationMemory, ConversationTurn, Role};
pub use persist::{DirectoryIndexStore, IndexSnapshot, IndexStore};
pub use pipeline::{Answer, BatchFailure, IngestReport, RagPipeline, RagPipelineBuilder};
pub use prompt::PromptTemplate;
pub use retry::RetryPolicy;
pub use session::{ChatMessage, ChatSession};
pub use source::{DirectorySource, DocumentFailure, DocumentSource, SourceDocuments};
pub use stream::{Fragments, fragments};
