use std::sync::Arc;

use anyhow::{Context, Result};
use lawgpt_rag::mock::MockGenerator;
use lawgpt_rag::{DirectorySource, FlatVectorIndex, IngestReport, RagPipeline};
use tracing::info;

use crate::cli::IngestArgs;
use crate::models;

pub async fn run(args: IngestArgs) -> Result<()> {
    let mut config = models::base_config(&args.model)?;
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunk_overlap = overlap;
    }
    if let Some(batch) = args.batch_size {
        config.ingest_batch_size = batch;
    }
    config.validate()?;

    let embedder = models::embedding_provider(&args.model)?;
    let index = Arc::new(FlatVectorIndex::new(embedder.dimensions()));
    // Ingest never generates, so no generation key is required.
    let generator = Arc::new(MockGenerator::new());

    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_index(index.clone())
        .generator(generator)
        .build()?;

    let source = DirectorySource::with_patterns(&args.data, &args.glob);
    info!(data = %args.data.display(), globs = ?args.glob, "loading documents");
    let report = pipeline.ingest_source(&source).await?;

    index
        .save(&args.index)
        .await
        .with_context(|| format!("failed to save index to {}", args.index.display()))?;

    print_report(&report);
    println!("Index written to {}", args.index.display());
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "Indexed {} documents as {} chunks.",
        report.documents_indexed, report.chunks_indexed
    );
    for failure in &report.unreadable {
        println!("  skipped {}: {}", failure.source_path, failure.error);
    }
    for failure in &report.failed_batches {
        println!(
            "  batch {} failed ({}): {}",
            failure.batch,
            failure.document_ids.join(", "),
            failure.error
        );
    }
    if !report.is_complete() {
        println!("Some documents were not indexed; rerun ingest to rebuild the index.");
    }
}
