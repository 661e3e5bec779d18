use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use docqa::adapters::{Embedder, FlatIndex, Generator};
use docqa::config::Config;
use docqa::domain::ChunkStrategy;
use docqa::ports::VectorIndex;
use docqa::services::{ChatService, Retriever};
use docqa::{DocQaError, Result};

mod ask;
mod chat;
mod clear;
mod ingest;
mod search;
mod status;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your documents and get answers grounded in them")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output as JSON")]
    pub json: bool,

    #[arg(short, long, global = true, help = "Log retrieval and ingestion details")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Extract, chunk and index documents")]
    Ingest {
        #[arg(required = true, help = "Files to index (.txt, .md, .rst)")]
        paths: Vec<PathBuf>,

        #[arg(long, help = "Number of files prepared concurrently")]
        concurrency: Option<usize>,

        #[arg(long, help = "Chunking strategy: window, paragraph")]
        strategy: Option<ChunkStrategy>,
    },

    #[command(about = "Ask a single question")]
    Ask {
        #[arg(help = "Question to answer from the indexed documents")]
        question: String,

        #[arg(long, help = "Number of chunks to retrieve")]
        top_k: Option<usize>,

        #[arg(long, help = "Minimum similarity score for retrieved chunks")]
        threshold: Option<f32>,

        #[arg(long, help = "Print the answer as it is generated")]
        stream: bool,
    },

    #[command(about = "Start an interactive chat session")]
    Chat {
        #[arg(help = "Files to index before the session starts")]
        paths: Vec<PathBuf>,

        #[arg(long, help = "Print answers as they are generated")]
        stream: bool,
    },

    #[command(about = "Show the chunks retrieved for a query")]
    Search {
        #[arg(help = "Search query")]
        query: String,

        #[arg(long, help = "Number of chunks to retrieve")]
        top_k: Option<usize>,

        #[arg(long, help = "Minimum similarity score for retrieved chunks")]
        threshold: Option<f32>,
    },

    #[command(about = "Show index statistics and configured providers")]
    Status,

    #[command(about = "Remove every indexed chunk")]
    Clear {
        #[arg(long, help = "Skip confirmation prompt")]
        force: bool,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Ingest {
            paths,
            concurrency,
            strategy,
        } => ingest::run(config, &paths, concurrency, strategy, cli.json).await,
        Commands::Ask {
            question,
            top_k,
            threshold,
            stream,
        } => {
            let config = with_retrieval_overrides(config, top_k, threshold)?;
            ask::run(&config, &question, stream, cli.json).await
        }
        Commands::Chat { paths, stream } => chat::run(&config, &paths, stream).await,
        Commands::Search {
            query,
            top_k,
            threshold,
        } => {
            let config = with_retrieval_overrides(config, top_k, threshold)?;
            search::run(&config, query, cli.json).await
        }
        Commands::Status => status::run(&config, cli.json).await,
        Commands::Clear { force } => clear::run(&config, force, cli.json).await,
    }
}

type Chat = ChatService<FlatIndex, Embedder, Generator>;

fn with_retrieval_overrides(
    mut config: Config,
    top_k: Option<usize>,
    threshold: Option<f32>,
) -> Result<Config> {
    if let Some(top_k) = top_k {
        config.retrieval.top_k = top_k;
    }
    if let Some(threshold) = threshold {
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(DocQaError::Config(format!(
                "threshold must be between -1 and 1, got {threshold}"
            )));
        }
        config.retrieval.score_threshold = Some(threshold);
    }
    config.validate()?;
    Ok(config)
}

async fn open_index(config: &Config) -> Result<Arc<FlatIndex>> {
    let index = FlatIndex::open(config.index_path());
    index.load().await?;
    Ok(Arc::new(index))
}

fn embedder(config: &Config) -> Result<Arc<Embedder>> {
    Ok(Arc::new(Embedder::from_config(&config.provider)?))
}

fn retriever(config: &Config, index: Arc<FlatIndex>) -> Result<Retriever<FlatIndex, Embedder>> {
    Ok(Retriever::new(
        index,
        embedder(config)?,
        config.retrieval.clone(),
    ))
}

fn chat_service(config: &Config, index: Arc<FlatIndex>) -> Result<Chat> {
    config.provider.require_credentials()?;
    let generator = Generator::from_config(&config.provider)?;
    Ok(ChatService::new(retriever(config, index)?, Arc::new(generator)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
