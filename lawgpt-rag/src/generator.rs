//! Generator trait for producing answers from an assembled prompt.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// A stream of text fragments produced by a streaming generation call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A large language model that completes a prompt.
///
/// Implementations report upstream failures as
/// [`RagError::GenerationUnavailable`](crate::RagError::GenerationUnavailable).
/// Sampling parameters (model, temperature, output length, timeout) are fixed
/// when the generator is constructed, typically from a
/// [`GenerationConfig`](crate::GenerationConfig).
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete the prompt and return the full response text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Complete the prompt, delivering the response incrementally.
    ///
    /// The default implementation awaits [`generate`](Generator::generate)
    /// and yields the whole response as a single fragment.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        let text: Result<String> = Ok(self.generate(prompt).await?);
        Ok(Box::pin(futures::stream::once(async move { text })))
    }

    /// A short name used in logs and error messages.
    fn name(&self) -> &str;
}
