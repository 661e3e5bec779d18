use console::style;
use serde::Serialize;

use docqa::Result;
use docqa::config::Config;
use docqa::domain::{SearchQuery, SearchResult};
use docqa::services::get_relevant_sources;

use super::{open_index, print_json, retriever};

const PREVIEW_CHARS: usize = 160;

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
    sources: Vec<String>,
    context_length: usize,
    context_truncated: bool,
}

pub async fn run(config: &Config, query: String, json: bool) -> Result<()> {
    let index = open_index(config).await?;
    let retriever = retriever(config, index)?;

    let results = retriever.search(&SearchQuery::new(query.as_str())).await?;
    let context = retriever.context(&results);
    let response = SearchResponse {
        sources: get_relevant_sources(&results),
        context_length: context.packed_len(),
        context_truncated: context.is_truncated(),
        query,
        results,
    };

    if json {
        print_json(&response)?;
    } else {
        print_search(&response);
    }
    Ok(())
}

fn print_search(response: &SearchResponse) {
    if response.results.is_empty() {
        println!("No results found for: \"{}\"", response.query);
        return;
    }

    println!();
    println!("Query: \"{}\"", response.query);
    println!("Found: {} chunks", response.results.len());
    println!();

    for (i, result) in response.results.iter().enumerate() {
        println!(
            "[{}] {} {}",
            i + 1,
            style(result.filename().unwrap_or("Unknown")).bold(),
            style(format!("score {:.3}", result.score)).dim()
        );
        println!("    {}", preview(result.text()));
        println!();
    }

    println!("Sources: {}", response.sources.join(", "));
    let truncated = if response.context_truncated {
        ", last excerpt truncated"
    } else {
        ""
    };
    println!("Context: {} characters{truncated}", response.context_length);
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
