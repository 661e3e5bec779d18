use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use docqa::Result;
use docqa::config::Config;
use docqa::domain::Session;
use docqa::ports::VectorIndex;

use super::ask::{print_answer, print_sources, stream_answer};
use super::ingest::ingest_files;
use super::{chat_service, open_index};

const HELP: &str =
    "Commands: /reset starts a new conversation, /clear empties the index, /quit exits";

pub async fn run(config: &Config, paths: &[PathBuf], stream: bool) -> Result<()> {
    let index = open_index(config).await?;
    let chat = chat_service(config, Arc::clone(&index))?;
    let mut session = Session::new();

    if !paths.is_empty() {
        let report = ingest_files(config, Arc::clone(&index), paths, true).await?;
        for file in &report.indexed_files {
            session.mark_processed(file.as_str());
        }
        println!(
            "Indexed {} chunks from {} files",
            report.chunks_indexed, report.files_processed
        );
    }
    if session.has_documents() {
        println!("{} {}", style("Documents:").dim(), session.processed_files.join(", "));
    }

    println!("{}", style(HELP).dim());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", style(">").cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("{}", style("Started a new conversation").dim());
            }
            "/clear" => {
                index.clear().await?;
                index.persist().await?;
                session.clear_documents();
                println!("{}", style("Index cleared, started a new conversation").dim());
            }
            question if stream => {
                let sources = stream_answer(&chat, &mut session, question).await?;
                print_sources(&sources);
                println!();
            }
            question => {
                let answer = chat.ask(&mut session, question).await;
                print_answer(&answer);
                println!();
            }
        }
    }

    Ok(())
}
