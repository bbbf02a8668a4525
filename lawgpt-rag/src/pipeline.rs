//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest workflow (chunk → embed →
//! index) and the conversational query workflow (embed → search → prompt →
//! generate → remember) by composing an [`EmbeddingProvider`], a
//! [`VectorIndex`], a [`Chunker`], and a [`Generator`].
//!
//! The pipeline holds no per-conversation state. Each call to
//! [`RagPipeline::answer`] receives the [`ChatSession`] it should read
//! history from and record the exchange into, so one pipeline (and one index)
//! can serve many sessions at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use lawgpt_rag::{ChatSession, FlatVectorIndex, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_index(Arc::new(FlatVectorIndex::new(768)))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let report = pipeline.ingest(&documents).await?;
//! let mut session = ChatSession::new(pipeline.config().memory_window);
//! let answer = pipeline.answer(&mut session, "What is the punishment for theft?").await?;
//! ```

use std::pin::pin;
use std::sync::Arc;
use std::thread::available_parallelism;

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::Generator;
use crate::index::{SearchOutcome, VectorIndex};
use crate::prompt::{PromptTemplate, render_condense};
use crate::retry::RetryPolicy;
use crate::session::ChatSession;
use crate::source::{DocumentFailure, DocumentSource};

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// The generated response text.
    pub text: String,
    /// Retrieved chunks placed in the prompt, best match first.
    pub sources: Vec<SearchResult>,
    /// Whether the index held no entries when the question was asked.
    pub empty_index: bool,
}

/// An ingest batch that was skipped because embedding or insertion failed.
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based position of the batch in the ingest run.
    pub batch: usize,
    /// The documents whose chunks were not indexed.
    pub document_ids: Vec<String>,
    /// The final error after retries.
    pub error: RagError,
}

/// What an ingest run indexed and what it skipped.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents whose chunks were all indexed.
    pub documents_indexed: usize,
    /// Chunks appended to the index.
    pub chunks_indexed: usize,
    /// Batches that were skipped, in batch order.
    pub failed_batches: Vec<BatchFailure>,
    /// Documents the source could not read.
    pub unreadable: Vec<DocumentFailure>,
}

impl IngestReport {
    /// Whether every document was read and indexed.
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty() && self.unreadable.is_empty()
    }
}

/// A prompt ready for generation.
struct PreparedPrompt {
    prompt: String,
    sources: Vec<SearchResult>,
    empty_index: bool,
}

/// The retrieval pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    chunker: Arc<dyn Chunker>,
    generator: Arc<dyn Generator>,
    prompt: PromptTemplate,
    retry: RetryPolicy,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Return a reference to the generator.
    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Number of embedding batches allowed in flight during ingest.
    ///
    /// `max_concurrency` from the config wins; otherwise the smaller of the
    /// available parallelism and the embedder's concurrent-request limit.
    pub fn ingest_workers(&self) -> usize {
        let workers = self.config.max_concurrency.unwrap_or_else(|| {
            let parallelism = available_parallelism().map_or(1, |n| n.get());
            self.embedding_provider
                .max_concurrent_requests()
                .map_or(parallelism, |limit| parallelism.min(limit))
        });
        workers.max(1)
    }

    /// Ingest documents: chunk → embed → index, in batches.
    ///
    /// Documents are grouped into batches of `ingest_batch_size`. Batches are
    /// embedded concurrently but inserted in batch order, so vector IDs do not
    /// depend on scheduling. A batch whose embedding fails after retries, or
    /// whose insertion is rejected, is skipped as a whole and listed in
    /// [`IngestReport::failed_batches`]; the remaining batches still run.
    ///
    /// # Errors
    ///
    /// Per-batch failures are reported, not returned. This only fails if
    /// `documents` cannot be processed at all.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let batch_size = self.config.ingest_batch_size.max(1);
        let workers = self.ingest_workers();
        info!(
            document_count = documents.len(),
            batch_size,
            workers,
            embedder = self.embedding_provider.name(),
            "starting ingest"
        );

        let mut report = IngestReport::default();
        let mut embedded = pin!(
            futures::stream::iter(documents.chunks(batch_size).enumerate())
                .map(|(batch, docs)| async move { (batch, docs, self.embed_documents(docs).await) })
                .buffered(workers)
        );

        while let Some((batch, docs, embedded_chunks)) = embedded.next().await {
            let outcome = match embedded_chunks {
                Ok(entries) if entries.is_empty() => Ok(0),
                Ok(entries) => {
                    let count = entries.len();
                    self.vector_index.insert(entries).await.map(|_| count)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(count) => {
                    debug!(batch, documents = docs.len(), chunks = count, "indexed batch");
                    report.documents_indexed += docs.len();
                    report.chunks_indexed += count;
                }
                Err(e) => {
                    let document_ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
                    warn!(batch, documents = ?document_ids, error = %e, "skipping batch");
                    report.failed_batches.push(BatchFailure { batch, document_ids, error: e });
                }
            }
        }

        info!(
            documents_indexed = report.documents_indexed,
            chunks_indexed = report.chunks_indexed,
            failed_batches = report.failed_batches.len(),
            "ingest finished"
        );
        Ok(report)
    }

    /// Load every document from `source` and ingest it.
    ///
    /// Unreadable documents are skipped and listed in [`IngestReport::unreadable`].
    ///
    /// # Errors
    ///
    /// Returns the source's error if it cannot be enumerated at all.
    pub async fn ingest_source(&self, source: &dyn DocumentSource) -> Result<IngestReport> {
        let loaded = source.load().await?;
        let mut report = self.ingest(&loaded.documents).await?;
        report.unreadable = loaded.failures;
        Ok(report)
    }

    async fn embed_documents(&self, documents: &[Document]) -> Result<Vec<(Vec<f32>, Chunk)>> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.chunker.chunk(d)).collect();
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self
            .retry
            .run("embed_batch", || self.embedding_provider.embed_batch(&texts))
            .await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable {
                provider: self.embedding_provider.name().to_string(),
                message: format!("expected {} embeddings, got {}", chunks.len(), embeddings.len()),
            });
        }
        Ok(embeddings.into_iter().zip(chunks).collect())
    }

    /// Retrieve the chunks most relevant to `query`.
    ///
    /// Results scoring below the configured `similarity_threshold` are
    /// dropped. An empty index yields [`SearchOutcome::EmptyIndex`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`] if the query cannot be
    /// embedded, [`RagError::DimensionMismatch`] if the embedder and index
    /// disagree, and [`RagError::RetrievalUnavailable`] for any other index failure.
    pub async fn retrieve(&self, query: &str) -> Result<SearchOutcome> {
        let query_embedding =
            self.retry.run("embed_query", || self.embedding_provider.embed(query)).await.map_err(
                |e| {
                    error!(error = %e, "embedding failed during query");
                    e
                },
            )?;

        let outcome =
            self.vector_index.search(&query_embedding, self.config.top_k).await.map_err(|e| {
                error!(error = %e, "vector index search failed");
                match e {
                    RagError::DimensionMismatch { .. } | RagError::RetrievalUnavailable(_) => e,
                    other => RagError::RetrievalUnavailable(other.to_string()),
                }
            })?;

        let outcome = match (outcome, self.config.similarity_threshold) {
            (SearchOutcome::Matches(results), Some(threshold)) => SearchOutcome::Matches(
                results.into_iter().filter(|r| r.score >= threshold).collect(),
            ),
            (outcome, _) => outcome,
        };

        match &outcome {
            SearchOutcome::EmptyIndex => info!("query ran against an empty index"),
            SearchOutcome::Matches(results) => {
                info!(result_count = results.len(), "query completed")
            }
        }
        Ok(outcome)
    }

    async fn prepare(&self, session: &ChatSession, question: &str) -> Result<PreparedPrompt> {
        let history = session.memory().recent();

        let standalone = if self.config.condense_question && !history.is_empty() {
            let condense_prompt = render_condense(&history, question);
            let rewritten = self
                .retry
                .run("condense_question", || self.generator.generate(&condense_prompt))
                .await?;
            let rewritten = rewritten.trim();
            debug!(session = %session.id(), standalone = rewritten, "condensed follow-up question");
            if rewritten.is_empty() { question.to_string() } else { rewritten.to_string() }
        } else {
            question.to_string()
        };

        let outcome = self.retrieve(&standalone).await?;
        let empty_index = outcome.is_empty_index();
        let sources = outcome.into_results();
        let prompt = self.prompt.render(&sources, &history, &standalone);
        Ok(PreparedPrompt { prompt, sources, empty_index })
    }

    /// Answer a question in the context of `session`.
    ///
    /// The question is embedded, the top `top_k` chunks are retrieved, and a
    /// prompt built from those chunks, the session's recent history, and the
    /// question is sent to the generator. On success the exchange is recorded
    /// in the session. An empty index is not an error: the answer is
    /// generated from empty context and flagged with `empty_index`.
    ///
    /// The session is only modified after generation succeeds, so a failed or
    /// cancelled (dropped) call leaves it untouched and the question can be
    /// retried as is.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`], [`RagError::DimensionMismatch`],
    /// or [`RagError::RetrievalUnavailable`] if retrieval fails, and
    /// [`RagError::GenerationUnavailable`] if the generator fails after retries.
    pub async fn answer(&self, session: &mut ChatSession, question: &str) -> Result<Answer> {
        let prepared = self.prepare(session, question).await?;

        let text = self
            .retry
            .run("generate", || self.generator.generate(&prepared.prompt))
            .await
            .map_err(|e| {
                error!(session = %session.id(), error = %e, "generation failed");
                e
            })?;

        session.record_exchange(question, &text);
        info!(
            session = %session.id(),
            sources = prepared.sources.len(),
            answer_len = text.len(),
            "answered question"
        );

        Ok(Answer { text, sources: prepared.sources, empty_index: prepared.empty_index })
    }

    /// Answer a question, yielding the response as it is generated.
    ///
    /// Retrieval and prompt assembly happen exactly as in
    /// [`answer`](Self::answer). The exchange is recorded in the session only
    /// once the generator's stream has ended; dropping the returned stream
    /// earlier, or an error mid-stream, leaves the session unchanged.
    pub fn answer_stream<'a>(
        &'a self,
        session: &'a mut ChatSession,
        question: &'a str,
    ) -> impl Stream<Item = Result<String>> + Send + 'a {
        async_stream::try_stream! {
            let prepared = self.prepare(session, question).await?;
            let mut fragments = self
                .retry
                .run("generate_stream", || self.generator.generate_stream(&prepared.prompt))
                .await?;

            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                text.push_str(&fragment);
                yield fragment;
            }

            session.record_exchange(question, &text);
            info!(session = %session.id(), answer_len = text.len(), "streamed answer");
        }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider, vector index, and generator are required. The
/// config defaults to [`RagConfig::default()`], the chunker to a
/// [`RecursiveChunker`] sized from the config, the prompt to the default
/// legal template, and the retry policy to the config's `retry` section.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .vector_index(Arc::new(index))
///     .generator(Arc::new(generator))
///     .prompt_template(PromptTemplate::new(custom)?)  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn Generator>>,
    prompt: Option<PromptTemplate>,
    retry: Option<RetryPolicy>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Override the answer prompt.
    pub fn prompt_template(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Override the retry policy for upstream calls.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if a required collaborator
    /// is missing or the config is invalid, and [`RagError::DimensionMismatch`]
    /// if the embedder's output length differs from the index dimensionality.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::InvalidConfiguration("embedding_provider is required".to_string())
        })?;
        let vector_index = self
            .vector_index
            .ok_or_else(|| RagError::InvalidConfiguration("vector_index is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::InvalidConfiguration("generator is required".to_string()))?;

        if embedding_provider.dimensions() != vector_index.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: vector_index.dimensions(),
                actual: embedding_provider.dimensions(),
            });
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let retry = self.retry.unwrap_or_else(|| RetryPolicy::from(&config.retry));

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_index,
            chunker,
            generator,
            prompt: self.prompt.unwrap_or_default(),
            retry,
        })
    }
}
