//! Configuration for the retrieval pipeline.
//!
//! [`RagConfig`] can be built in code through [`RagConfig::builder()`] or read
//! from TOML. Every construction path ends in [`RagConfig::validate`], so a
//! config that reaches the pipeline is always consistent.
//!
//! ```toml
//! chunk_size = 1024
//! chunk_overlap = 200
//! top_k = 4
//! memory_window = 2
//!
//! [retry]
//! max_attempts = 3
//!
//! [generation]
//! model = "togethercomputer/StripedHyena-Nous-7B"
//! temperature = 0.5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results. `None` keeps every result.
    pub similarity_threshold: Option<f32>,
    /// Number of question/answer pairs kept in conversation memory.
    pub memory_window: usize,
    /// Number of documents embedded and inserted together during ingest.
    pub ingest_batch_size: usize,
    /// Upper bound on concurrent embedding batches during ingest.
    pub max_concurrency: Option<usize>,
    /// Rewrite follow-up questions into standalone questions before retrieval.
    pub condense_question: bool,
    /// Backoff policy for upstream embedding and generation calls.
    pub retry: RetryConfig,
    /// Parameters forwarded to the generator.
    pub generation: GenerationConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 200,
            top_k: 4,
            similarity_threshold: None,
            memory_window: 2,
            ingest_batch_size: 16,
            max_concurrency: None,
            condense_question: false,
            retry: RetryConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 200, max_backoff_ms: 5_000, multiplier: 2.0 }
    }
}

/// Settings forwarded to the hosted language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model identifier understood by the generator backend.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of tokens in the completion.
    pub max_output_tokens: u32,
    /// Sampling temperature in `0.0..=1.0`; higher is more diverse, less deterministic.
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "togethercomputer/StripedHyena-Nous-7B".to_string(),
            timeout_secs: 60,
            max_output_tokens: 1024,
            temperature: 0.5,
        }
    }
}

impl GenerationConfig {
    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a config from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the TOML is malformed or
    /// the resulting values fail [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RagError::InvalidConfiguration(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the file cannot be read
    /// or its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RagError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check that all parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `memory_window`, or `ingest_batch_size` is zero
    /// - `max_concurrency` is `Some(0)`
    /// - `retry.max_attempts == 0` or `retry.multiplier < 1.0`
    /// - `generation.temperature` is outside `0.0..=1.0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.memory_window == 0 {
            return Err(RagError::InvalidConfiguration(
                "memory_window must be greater than zero".to_string(),
            ));
        }
        if self.ingest_batch_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "ingest_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(RagError::InvalidConfiguration(
                "max_concurrency must be greater than zero when set".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::InvalidConfiguration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(RagError::InvalidConfiguration(format!(
                "retry.multiplier ({}) must be at least 1.0",
                self.retry.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.generation.temperature) {
            return Err(RagError::InvalidConfiguration(format!(
                "generation.temperature ({}) must be within 0.0..=1.0",
                self.generation.temperature
            )));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set how many question/answer pairs conversation memory keeps.
    pub fn memory_window(mut self, pairs: usize) -> Self {
        self.config.memory_window = pairs;
        self
    }

    /// Set how many documents form one ingest batch.
    pub fn ingest_batch_size(mut self, documents: usize) -> Self {
        self.config.ingest_batch_size = documents;
        self
    }

    /// Bound the number of embedding batches in flight during ingest.
    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.config.max_concurrency = Some(workers);
        self
    }

    /// Enable or disable follow-up question condensing.
    pub fn condense_question(mut self, enabled: bool) -> Self {
        self.config.condense_question = enabled;
        self
    }

    /// Set the retry policy for upstream calls.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the generation parameters.
    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] under the conditions listed
    /// on [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
