//! End-to-end ingest and answer behaviour with fake collaborators.

use std::pin::pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lawgpt_rag::mock::MockEmbeddingProvider;
use lawgpt_rag::{
    ChatSession, Chunk, DirectorySource, DistanceMetric, Document, EmbeddingProvider,
    FlatVectorIndex, Generator, RagConfig, RagError, RagPipeline, Result, SearchOutcome,
    TextStream, VectorIndex,
};

const DIM: usize = 64;

/// Fails every batch that contains the word "poison".
struct PoisonedEmbedder {
    inner: MockEmbeddingProvider,
    failures: AtomicU32,
}

impl PoisonedEmbedder {
    fn new() -> Self {
        Self { inner: MockEmbeddingProvider::new(DIM), failures: AtomicU32::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for PoisonedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(RagError::EmbeddingUnavailable {
                provider: "poisoned".into(),
                message: "503 service unavailable".into(),
            });
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "poisoned"
    }
}

/// Records every prompt and replies with a fixed answer, or a rewrite for
/// condense prompts.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("Standalone question:") {
            Ok("What is the punishment for robbery?".to_string())
        } else {
            Ok("- Section 302 prescribes death or life imprisonment.".to_string())
        }
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let fragments =
            ["- Section ", "302 ", "applies."].map(|f| Ok::<_, RagError>(f.to_string()));
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct FailingGenerator {
    calls: AtomicU32,
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::GenerationUnavailable {
            provider: "failing".into(),
            message: "timeout".into(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct HangingGenerator;

#[async_trait]
impl Generator for HangingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        futures::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// An index whose backing files went bad after it was opened.
struct CorruptIndex;

#[async_trait]
impl VectorIndex for CorruptIndex {
    async fn insert(&self, _entries: Vec<(Vec<f32>, Chunk)>) -> Result<Vec<u64>> {
        Err(self.corrupt())
    }

    async fn search(&self, _query: &[f32], _top_k: usize) -> Result<SearchOutcome> {
        Err(self.corrupt())
    }

    async fn len(&self) -> usize {
        0
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}

impl CorruptIndex {
    fn corrupt(&self) -> RagError {
        RagError::Persistence { location: "index".into(), message: "checksum mismatch".into() }
    }
}

fn pipeline_with(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_index(Arc::new(FlatVectorIndex::new(DIM)))
        .generator(generator)
        .build()
        .unwrap()
}

fn legal_documents() -> Vec<Document> {
    vec![
        Document::new(
            "ipc_302",
            "Whoever commits murder shall be punished with death.",
            "ipc/302.txt",
        ),
        Document::new(
            "ipc_378",
            "Whoever intends to take movable property dishonestly commits theft.",
            "ipc/378.txt",
        ),
        Document::new(
            "ipc_390",
            "In all robbery there is either theft or extortion.",
            "ipc/390.txt",
        ),
    ]
}

#[tokio::test]
async fn two_document_scenario_indexes_every_chunk() {
    let config = RagConfig::builder().chunk_size(2).chunk_overlap(0).build().unwrap();
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let pipeline = pipeline_with(config, embedder.clone(), Arc::new(RecordingGenerator::default()));

    let report = pipeline
        .ingest(&[Document::new("doc1", "A B C D", "a.txt"), Document::new("doc2", "E F", "e.txt")])
        .await
        .unwrap();

    // "A B C D" splits into "A ", "B ", "C ", "D"; "E F" into "E ", "F".
    assert!(report.is_complete());
    assert_eq!(report.documents_indexed, 2);
    assert_eq!(report.chunks_indexed, 6);
    assert_eq!(pipeline.vector_index().len().await, 6);

    let query = embedder.embed("A ").await.unwrap();
    let results = pipeline.vector_index().search(&query, 3).await.unwrap().into_results();
    assert_eq!(results[0].chunk.id, "doc1_0");
    assert_eq!(results[0].chunk.text, "A ");
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_reported_and_others_still_index() {
    let config =
        RagConfig::builder().chunk_size(64).chunk_overlap(8).ingest_batch_size(1).build().unwrap();
    let embedder = Arc::new(PoisonedEmbedder::new());
    let pipeline = pipeline_with(config, embedder.clone(), Arc::new(RecordingGenerator::default()));

    let documents = vec![
        Document::new("bad", "poison pill text", "bad.txt"),
        Document::new("good", "Section 378 defines theft.", "good.txt"),
    ];
    let report = pipeline.ingest(&documents).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.failed_batches.len(), 1);
    let failure = &report.failed_batches[0];
    assert_eq!(failure.batch, 0);
    assert_eq!(failure.document_ids, vec!["bad".to_string()]);
    assert!(matches!(failure.error, RagError::EmbeddingUnavailable { .. }));
    // Three attempts under the default retry policy.
    assert_eq!(embedder.failures.load(Ordering::SeqCst), 3);

    let query = embedder.embed("Section 378 defines theft.").await.unwrap();
    let results = pipeline.vector_index().search(&query, 4).await.unwrap().into_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.document_id, "good");
}

#[tokio::test]
async fn concurrent_batches_insert_in_document_order() {
    let config = RagConfig::builder().ingest_batch_size(1).max_concurrency(3).build().unwrap();
    let pipeline = pipeline_with(
        config,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        Arc::new(RecordingGenerator::default()),
    );
    assert_eq!(pipeline.ingest_workers(), 3);

    let report = pipeline.ingest(&legal_documents()).await.unwrap();
    assert_eq!(report.documents_indexed, 3);

    // A zero query scores every entry equally, so results come back in insertion order.
    let results = pipeline.vector_index().search(&[0.0; DIM], 10).await.unwrap().into_results();
    let order: Vec<&str> = results.iter().map(|r| r.chunk.document_id.as_str()).collect();
    assert_eq!(order, vec!["ipc_302", "ipc_378", "ipc_390"]);
}

#[tokio::test]
async fn answer_on_empty_index_uses_empty_context_and_records_memory() {
    let generator = Arc::new(RecordingGenerator::default());
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let pipeline = pipeline_with(RagConfig::default(), embedder, generator.clone());
    let mut session = ChatSession::new(2);

    let answer = pipeline.answer(&mut session, "What is X?").await.unwrap();

    assert!(answer.empty_index);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.text, "- Section 302 prescribes death or life imprisonment.");
    assert!(generator.prompts()[0].contains("CONTEXT: \n"));
    assert_eq!(session.memory().len(), 2);
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn answer_grounds_prompt_on_retrieved_chunks_and_history() {
    let generator = Arc::new(RecordingGenerator::default());
    let config = RagConfig::builder().top_k(1).build().unwrap();
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let pipeline = pipeline_with(config, embedder, generator.clone());
    pipeline.ingest(&legal_documents()).await.unwrap();
    let mut session = ChatSession::new(2);

    let first = pipeline.answer(&mut session, "punished with death for murder").await.unwrap();
    assert!(!first.empty_index);
    assert_eq!(first.sources.len(), 1);
    assert_eq!(first.sources[0].chunk.document_id, "ipc_302");
    assert!(generator.prompts()[0].contains("Whoever commits murder"));

    pipeline.answer(&mut session, "and theft?").await.unwrap();
    let second_prompt = &generator.prompts()[1];
    assert!(second_prompt.contains("Human: punished with death for murder"));
    assert!(second_prompt.contains("AI: - Section 302"));
}

#[tokio::test]
async fn similarity_threshold_filters_weak_matches() {
    let config = RagConfig::builder().similarity_threshold(0.99).build().unwrap();
    let pipeline = pipeline_with(
        config,
        Arc::new(MockEmbeddingProvider::new(DIM)),
        Arc::new(RecordingGenerator::default()),
    );
    pipeline.ingest(&legal_documents()).await.unwrap();
    let mut session = ChatSession::new(2);

    let answer = pipeline.answer(&mut session, "registration of motor vehicles").await.unwrap();
    assert!(!answer.empty_index);
    assert!(answer.sources.is_empty());
}

#[tokio::test(start_paused = true)]
async fn generation_failure_leaves_memory_untouched() {
    let generator = Arc::new(FailingGenerator { calls: AtomicU32::new(0) });
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let pipeline = pipeline_with(RagConfig::default(), embedder, generator.clone());
    let mut session = ChatSession::new(2);
    session.record_exchange("earlier", "answer");

    let err = pipeline.answer(&mut session, "What is X?").await.unwrap_err();

    assert!(matches!(err, RagError::GenerationUnavailable { .. }));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    assert_eq!(session.memory().len(), 2);
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_answer_leaves_memory_untouched() {
    let pipeline = pipeline_with(
        RagConfig::default(),
        Arc::new(MockEmbeddingProvider::new(DIM)),
        Arc::new(HangingGenerator),
    );
    let mut session = ChatSession::new(2);

    let answer = pipeline.answer(&mut session, "What is X?");
    let outcome = tokio::time::timeout(Duration::from_secs(5), answer).await;

    assert!(outcome.is_err());
    assert!(session.memory().is_empty());
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn streamed_answer_commits_only_when_complete() {
    let pipeline = pipeline_with(
        RagConfig::default(),
        Arc::new(MockEmbeddingProvider::new(DIM)),
        Arc::new(RecordingGenerator::default()),
    );
    let mut session = ChatSession::new(2);

    {
        let mut stream = pin!(pipeline.answer_stream(&mut session, "abandoned"));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "- Section ");
    }
    assert!(session.memory().is_empty());

    let fragments: Vec<String> = {
        let stream = pipeline.answer_stream(&mut session, "completed");
        stream.map(|f| f.unwrap()).collect().await
    };
    assert_eq!(fragments.concat(), "- Section 302 applies.");
    assert_eq!(session.memory().len(), 2);
    assert_eq!(session.messages()[0].content, "completed");
    assert_eq!(session.messages()[1].content, "- Section 302 applies.");
}

#[tokio::test]
async fn follow_up_is_condensed_before_retrieval() {
    let generator = Arc::new(RecordingGenerator::default());
    let config = RagConfig::builder().condense_question(true).build().unwrap();
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let pipeline = pipeline_with(config, embedder, generator.clone());
    pipeline.ingest(&legal_documents()).await.unwrap();
    let mut session = ChatSession::new(2);

    pipeline.answer(&mut session, "What is the punishment for theft?").await.unwrap();
    // No history yet: a single generation call.
    assert_eq!(generator.prompts().len(), 1);

    pipeline.answer(&mut session, "and for robbery?").await.unwrap();
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("Follow Up Input: and for robbery?"));
    assert!(prompts[2].contains("QUESTION: What is the punishment for robbery?"));
    assert_eq!(session.messages()[2].content, "and for robbery?");
}

#[tokio::test]
async fn builder_rejects_embedder_and_index_disagreement() {
    let result = RagPipeline::builder()
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(8)))
        .vector_index(Arc::new(FlatVectorIndex::new(4)))
        .generator(Arc::new(RecordingGenerator::default()))
        .build();
    assert!(matches!(result, Err(RagError::DimensionMismatch { expected: 4, actual: 8 })));

    let missing = RagPipeline::builder().vector_index(Arc::new(FlatVectorIndex::new(4))).build();
    assert!(matches!(missing, Err(RagError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn ingest_source_reports_unreadable_documents() {
    let temp = tempfile::tempdir().unwrap();
    let murder = "Whoever commits murder shall be punished.";
    std::fs::write(temp.path().join("302.txt"), murder).unwrap();
    std::fs::write(temp.path().join("scan.txt"), [0xc3, 0x28]).unwrap();

    let pipeline = pipeline_with(
        RagConfig::default(),
        Arc::new(MockEmbeddingProvider::new(DIM)),
        Arc::new(RecordingGenerator::default()),
    );
    let source = DirectorySource::new(temp.path(), "*.txt");
    let report = pipeline.ingest_source(&source).await.unwrap();

    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.unreadable.len(), 1);
    assert!(report.unreadable[0].source_path.ends_with("scan.txt"));
    assert!(!report.is_complete());
}

#[tokio::test]
async fn unreadable_index_fails_retrieval_and_leaves_session_untouched() {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = RagPipeline::builder()
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(DIM)))
        .vector_index(Arc::new(CorruptIndex))
        .generator(generator.clone())
        .build()
        .unwrap();
    let mut session = ChatSession::new(2);
    session.record_exchange("earlier", "answer");

    let err = pipeline.answer(&mut session, "What is X?").await.unwrap_err();
    assert!(matches!(err, RagError::RetrievalUnavailable(ref m) if m.contains("checksum")));

    let streamed = {
        let mut stream = pin!(pipeline.answer_stream(&mut session, "What is X?"));
        stream.next().await.unwrap()
    };
    assert!(matches!(streamed, Err(RagError::RetrievalUnavailable(_))));

    assert!(generator.prompts().is_empty());
    assert_eq!(session.memory().len(), 2);
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[0].content, "earlier");
}
