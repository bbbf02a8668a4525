//! LawGPT command-line interface: build an index, then chat with it.

use anyhow::Result;
use clap::Parser as _;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

mod chat;
mod cli;
mod ingest;
mod models;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries answers; logs go to stderr.
    let filter =
        if cli.verbose { "lawgpt=debug,lawgpt_rag=debug" } else { "lawgpt=warn,lawgpt_rag=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ingest(args) => ingest::run(args).await,
        Commands::Chat(args) => chat::run(args).await,
    }
}
