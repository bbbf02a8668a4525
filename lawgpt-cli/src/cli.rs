use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lawgpt")]
#[command(about = "Ask questions about the Indian Penal Code over an indexed corpus")]
#[command(long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Log at debug level (RUST_LOG overrides)")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Chunk, embed, and index a directory of documents")]
    Ingest(IngestArgs),

    #[command(about = "Start an interactive question-answering session")]
    Chat(ChatArgs),
}

/// Options shared by every command that talks to the models.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    #[arg(short, long, help = "TOML config file; flags override its values")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Use deterministic offline models instead of hosted APIs")]
    pub offline: bool,

    #[arg(long, help = "Embedding model served by the embeddings endpoint")]
    pub embedding_model: Option<String>,

    #[arg(long, help = "Truncate embeddings to this many dimensions")]
    pub embedding_dimensions: Option<usize>,

    #[arg(long, help = "Base URL of an OpenAI-compatible embeddings host")]
    pub embedding_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[arg(short, long, help = "Directory containing the documents")]
    pub data: PathBuf,

    #[arg(
        short,
        long,
        default_values = ["*.pdf", "*.txt"],
        help = "Glob pattern relative to --data; repeat to match several"
    )]
    pub glob: Vec<String>,

    #[arg(short, long, default_value = "index", help = "Directory to write the index to")]
    pub index: PathBuf,

    #[arg(long, help = "Maximum characters per chunk")]
    pub chunk_size: Option<usize>,

    #[arg(long, help = "Characters shared by consecutive chunks")]
    pub chunk_overlap: Option<usize>,

    #[arg(long, help = "Documents embedded per batch")]
    pub batch_size: Option<usize>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[arg(short, long, default_value = "index", help = "Directory holding a saved index")]
    pub index: PathBuf,

    #[arg(long, help = "Number of chunks retrieved per question")]
    pub top_k: Option<usize>,

    #[arg(long, help = "Generation model identifier")]
    pub model_name: Option<String>,

    #[arg(long, help = "Sampling temperature between 0.0 and 1.0")]
    pub temperature: Option<f32>,

    #[arg(long, help = "Base URL of an OpenAI-compatible chat completions host")]
    pub generation_url: Option<String>,

    #[arg(long, help = "Print answers at once instead of typing them out")]
    pub no_typing: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}
