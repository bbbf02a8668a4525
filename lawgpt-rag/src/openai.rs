//! Collaborators backed by OpenAI-compatible HTTP APIs.
//!
//! Works with OpenAI itself and with hosts exposing the same `/embeddings`
//! and `/chat/completions` endpoints (Together AI among them). This module is
//! only available when the `openai` feature is enabled.

use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::GenerationConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::{Generator, TextStream};

/// The OpenAI API root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The Together AI API root, which hosts the default generation model.
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

/// The default model for embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Read the first non-empty variable among `names`.
fn api_key_from_env(names: &[&str]) -> Option<String> {
    names.iter().filter_map(|name| std::env::var(name).ok()).find(|key| !key.trim().is_empty())
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `base_url` – defaults to [`OPENAI_BASE_URL`].
/// - `api_key` – from the constructor, or `LAWGPT_API_KEY` / `OPENAI_API_KEY`.
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("punishment for theft").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
    max_concurrent_requests: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "embedding API key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(DEFAULT_EMBEDDING_TIMEOUT)?,
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
            max_concurrent_requests: Some(8),
        })
    }

    /// Create a provider using `LAWGPT_API_KEY`, falling back to `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env(&["LAWGPT_API_KEY", "OPENAI_API_KEY"]).ok_or_else(|| {
            RagError::InvalidConfiguration(
                "set LAWGPT_API_KEY or OPENAI_API_KEY to use the embeddings API".to_string(),
            )
        })?;
        Self::new(api_key)
    }

    /// Point at another OpenAI-compatible host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        Ok(self)
    }

    /// Set the limit on concurrent requests the host accepts.
    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = Some(limit.max(1));
        self
    }

    fn unavailable(&self, message: impl Into<String>) -> RagError {
        RagError::EmbeddingUnavailable { provider: "openai".into(), message: message.into() }
    }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ApiMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChunkChoice>,
}

#[derive(Deserialize)]
struct ChatChunkChoice {
    delta: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "openai", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| self.unavailable("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "openai",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "openai", error = %e, "request failed");
                self.unavailable(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "openai", detail = %detail, "API error");
            return Err(self.unavailable(detail));
        }

        let mut embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "openai", error = %e, "failed to parse response");
            self.unavailable(format!("failed to parse response: {e}"))
        })?;

        if embedding_response.data.len() != texts.len() {
            return Err(self.unavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embedding_response.data.len()
            )));
        }
        embedding_response.data.sort_by_key(|d| d.index);
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn max_concurrent_requests(&self) -> Option<usize> {
        self.max_concurrent_requests
    }
}

/// A [`Generator`] backed by an OpenAI-compatible chat completions API.
///
/// The prompt is sent as a single user message. Model, output length,
/// temperature, and timeout come from [`GenerationConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::{GenerationConfig, openai::{OpenAIChatGenerator, TOGETHER_BASE_URL}};
///
/// let generator = OpenAIChatGenerator::from_env(&GenerationConfig::default())?
///     .with_base_url(TOGETHER_BASE_URL);
/// let answer = generator.generate("What does section 302 cover?").await?;
/// ```
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    config: GenerationConfig,
}

impl OpenAIChatGenerator {
    /// Create a generator with the given API key and parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the key is empty.
    pub fn new(api_key: impl Into<String>, config: &GenerationConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "generation API key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(config.timeout())?,
            api_key,
            base_url: TOGETHER_BASE_URL.into(),
            config: config.clone(),
        })
    }

    /// Create a generator using `LAWGPT_API_KEY`, `TOGETHER_API_KEY`, or
    /// `OPENAI_API_KEY`, in that order.
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = api_key_from_env(&["LAWGPT_API_KEY", "TOGETHER_API_KEY", "OPENAI_API_KEY"])
            .ok_or_else(|| {
                RagError::InvalidConfiguration(
                    "set LAWGPT_API_KEY, TOGETHER_API_KEY, or OPENAI_API_KEY to generate answers"
                        .to_string(),
                )
            })?;
        Self::new(api_key, config)
    }

    /// Point at another OpenAI-compatible host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request<'a>(&'a self, prompt: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: [ApiMessage { role: "user", content: prompt }],
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            stream,
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        debug!(
            provider = "openai",
            model = %self.config.model,
            prompt_len = prompt.len(),
            stream,
            "requesting completion"
        );

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt, stream))
            .send()
            .await
            .map_err(|e| {
                error!(provider = "openai", error = %e, "request failed");
                generation_unavailable(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "openai", detail = %detail, "API error");
            return Err(generation_unavailable(detail));
        }
        Ok(response)
    }
}

fn generation_unavailable(message: impl Into<String>) -> RagError {
    RagError::GenerationUnavailable { provider: "openai".into(), message: message.into() }
}

/// What one server-sent event contributes to the answer.
#[derive(Debug, PartialEq)]
enum StreamEvent {
    Content(String),
    Done,
    Skip,
}

fn parse_event(data: &str) -> Result<StreamEvent> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }
    if data.is_empty() {
        return Ok(StreamEvent::Skip);
    }
    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| generation_unavailable(format!("malformed stream event: {e}")))?;
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => Ok(StreamEvent::Content(text)),
        _ => Ok(StreamEvent::Skip),
    }
}

/// Decode a chat completions event stream into content fragments.
///
/// Ends at the `[DONE]` sentinel, or when the body ends.
fn sse_fragments<S, B, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_stream::try_stream! {
        let mut events = pin!(bytes.eventsource());
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| generation_unavailable(format!("stream interrupted: {e}")))?;
            match parse_event(&event.data)? {
                StreamEvent::Content(text) => yield text,
                StreamEvent::Done => break,
                StreamEvent::Skip => {}
            }
        }
    }
}

#[async_trait]
impl Generator for OpenAIChatGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;
        let body: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = "openai", error = %e, "failed to parse response");
            generation_unavailable(format!("failed to parse response: {e}"))
        })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| generation_unavailable("API returned no completion"))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        let bytes = self.send(prompt, true).await?.bytes_stream();
        Ok(Box::pin(sse_fragments(bytes)))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
