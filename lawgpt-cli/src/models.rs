//! Resolving config and model backends from command-line options.

use std::sync::Arc;

use anyhow::{Context, Result};
use lawgpt_rag::mock::{MockEmbeddingProvider, MockGenerator};
use lawgpt_rag::openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
use lawgpt_rag::{EmbeddingProvider, GenerationConfig, Generator, RagConfig};
use tracing::info;

use crate::cli::ModelArgs;

/// Dimensionality of offline embeddings.
pub const OFFLINE_DIMENSIONS: usize = 256;

/// Read `--config` if given, otherwise start from defaults.
pub fn base_config(args: &ModelArgs) -> Result<RagConfig> {
    match &args.config {
        Some(path) => RagConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(RagConfig::default()),
    }
}

pub fn embedding_provider(args: &ModelArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    if args.offline {
        info!(dimensions = OFFLINE_DIMENSIONS, "using offline embeddings");
        return Ok(Arc::new(MockEmbeddingProvider::new(OFFLINE_DIMENSIONS)));
    }

    let mut provider = OpenAIEmbeddingProvider::from_env()?;
    if let Some(url) = &args.embedding_url {
        provider = provider.with_base_url(url);
    }
    if let Some(model) = &args.embedding_model {
        provider = provider.with_model(model);
    }
    if let Some(dimensions) = args.embedding_dimensions {
        provider = provider.with_dimensions(dimensions);
    }
    info!(dimensions = provider.dimensions(), "using hosted embeddings");
    Ok(Arc::new(provider))
}

pub fn generator(
    args: &ModelArgs,
    config: &GenerationConfig,
    base_url: Option<&str>,
) -> Result<Arc<dyn Generator>> {
    if args.offline {
        info!("using offline generator");
        return Ok(Arc::new(MockGenerator::new()));
    }

    let mut generator = OpenAIChatGenerator::from_env(config)?;
    if let Some(url) = base_url {
        generator = generator.with_base_url(url);
    }
    info!(model = %config.model, temperature = config.temperature, "using hosted generator");
    Ok(Arc::new(generator))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> ModelArgs {
        ModelArgs {
            config: None,
            offline: true,
            embedding_model: None,
            embedding_dimensions: None,
            embedding_url: None,
        }
    }

    #[test]
    fn offline_models_need_no_credentials() {
        let args = offline();
        assert_eq!(embedding_provider(&args).unwrap().dimensions(), OFFLINE_DIMENSIONS);
        assert_eq!(generator(&args, &GenerationConfig::default(), None).unwrap().name(), "mock");
    }

    #[test]
    fn config_file_is_read_when_given() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lawgpt.toml");
        std::fs::write(&path, "top_k = 7\n").unwrap();

        let args = ModelArgs { config: Some(path), ..offline() };
        assert_eq!(base_config(&args).unwrap().top_k, 7);
    }
}
