//! Deterministic offline collaborators.
//!
//! These stand in for hosted models when running without network access or
//! API keys. Retrieval quality is only as good as word overlap, but every
//! result is reproducible.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generator::{Generator, TextStream};

/// Embeds text by hashing lowercase words into signed buckets.
///
/// Texts sharing words point in similar directions, and vectors are
/// L2-normalised so cosine similarity equals the dot product.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing vectors of the given length (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = fnv1a(&word.to_lowercase());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// FNV-1a. Must not change between releases or saved offline indexes stop matching queries.
fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Answers with the retrieved context instead of calling a model.
///
/// The reply quotes whatever follows the `CONTEXT:` marker of the default
/// prompt (or the whole prompt when there is none), so offline runs show
/// what retrieval found. Streaming yields one word at a time.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator;

impl MockGenerator {
    /// Create the generator.
    pub fn new() -> Self {
        Self
    }

    fn reply(prompt: &str) -> String {
        let context = prompt
            .split_once("CONTEXT:")
            .map(|(_, rest)| rest.split_once("CHAT HISTORY:").map_or(rest, |(context, _)| context))
            .unwrap_or(prompt)
            .trim();

        if context.is_empty() {
            "- No indexed provisions matched this question.".to_string()
        } else {
            let excerpt: String = context.chars().take(400).collect();
            format!("- Retrieved context (offline mode):\n{excerpt}")
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(Self::reply(prompt))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        let reply = Self::reply(prompt);
        let words: Vec<Result<String>> =
            reply.split_inclusive(' ').map(|word| Ok(word.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
