use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use docqa::Result;
use docqa::adapters::{FlatIndex, TextExtractor};
use docqa::config::Config;
use docqa::domain::ChunkStrategy;
use docqa::services::{CancelFlag, Chunker, IngestEvent, IngestionReport, IngestionService};

use super::{embedder, open_index, print_json};

pub async fn run(
    mut config: Config,
    paths: &[PathBuf],
    concurrency: Option<usize>,
    strategy: Option<ChunkStrategy>,
    json: bool,
) -> Result<()> {
    if let Some(concurrency) = concurrency {
        config.ingest.concurrency = concurrency.max(1);
    }
    if let Some(strategy) = strategy {
        config.chunking.strategy = strategy;
    }

    let index = open_index(&config).await?;
    let report = ingest_files(&config, index, paths, !json).await?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Runs one ingestion with Ctrl-C wired to cancellation.
pub async fn ingest_files(
    config: &Config,
    index: Arc<FlatIndex>,
    paths: &[PathBuf],
    show_progress: bool,
) -> Result<IngestionReport> {
    let service = IngestionService::new(
        Arc::new(TextExtractor::new()),
        embedder(config)?,
        index,
        Chunker::from_config(&config.chunking)?,
        config.ingest.clone(),
    );

    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let progress = if show_progress {
        progress_bar(paths.len())
    } else {
        ProgressBar::hidden()
    };

    let result = service
        .ingest_with_progress(paths, &cancel, |event| {
            match event {
                IngestEvent::Indexed { file, chunks } => {
                    progress.set_message(format!("{file} ({chunks} chunks)"));
                }
                IngestEvent::Skipped(warning) => {
                    progress.println(format!(
                        "{} {}: {}",
                        style("skipped").yellow(),
                        warning.file,
                        warning.message
                    ));
                }
            }
            progress.inc(1);
        })
        .await;

    watcher.abort();
    progress.finish_and_clear();
    result
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}") {
        bar.set_style(bar_style.progress_chars("=> "));
    }
    bar
}

fn print_report(report: &IngestionReport) {
    if report.cancelled {
        println!(
            "{} after {} files, index left unchanged on disk",
            style("Cancelled").red().bold(),
            report.files_processed
        );
        return;
    }

    println!(
        "{} {} files, {} chunks",
        style("Indexed").green().bold(),
        report.files_processed,
        report.chunks_indexed
    );
    for file in &report.indexed_files {
        println!("  {file}");
    }

    if !report.warnings.is_empty() {
        println!();
        println!("{} {} files", style("Skipped").yellow().bold(), report.files_failed);
        for warning in &report.warnings {
            println!("  {}: {}", warning.file, warning.message);
        }
    }
}
