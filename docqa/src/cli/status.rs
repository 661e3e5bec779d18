use console::style;
use serde::Serialize;

use docqa::Result;
use docqa::config::Config;
use docqa::domain::IndexStats;
use docqa::ports::VectorIndex;

use super::{open_index, print_json};

#[derive(Serialize)]
struct StatusResponse {
    index_path: String,
    #[serde(flatten)]
    stats: IndexStats,
    embedding_provider: String,
    embedding_model: String,
    chat_provider: String,
    chat_model: String,
}

pub async fn run(config: &Config, json: bool) -> Result<()> {
    let index_path = config.index_path();
    let index = open_index(config).await?;
    let provider = &config.provider;

    let status = StatusResponse {
        index_path: index_path.display().to_string(),
        stats: index.stats().await?,
        embedding_provider: provider.embedding.to_string(),
        embedding_model: provider.embedding_model().to_string(),
        chat_provider: provider.chat.to_string(),
        chat_model: provider.chat_model().to_string(),
    };

    if json {
        print_json(&status)?;
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &StatusResponse) {
    println!("{}", style("docqa status").bold());
    println!();
    println!("  Index:      {}", status.index_path);
    println!("  Chunks:     {}", status.stats.count);
    match status.stats.dimension {
        Some(dimension) => println!("  Dimension:  {dimension}"),
        None => println!("  Dimension:  {}", style("empty").dim()),
    }
    println!(
        "  Embeddings: {} ({})",
        status.embedding_provider, status.embedding_model
    );
    println!("  Chat:       {} ({})", status.chat_provider, status.chat_model);
}
