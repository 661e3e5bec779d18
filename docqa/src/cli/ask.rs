use std::io::Write;

use console::style;
use futures::StreamExt;

use docqa::Result;
use docqa::config::Config;
use docqa::domain::Session;
use docqa::services::{ChatAnswer, StreamGate};
use docqa::services::chat::generation_error_text;

use super::{Chat, chat_service, open_index, print_json};

pub async fn run(config: &Config, question: &str, stream: bool, json: bool) -> Result<()> {
    let index = open_index(config).await?;
    let chat = chat_service(config, index)?;
    let mut session = Session::new();

    if stream && !json {
        let sources = stream_answer(&chat, &mut session, question).await?;
        print_sources(&sources);
        return Ok(());
    }

    let answer = chat.ask(&mut session, question).await;
    if json {
        print_json(&answer)?;
    } else {
        print_answer(&answer);
    }
    Ok(())
}

/// Prints fragments as they arrive and returns the sources of the recorded answer.
///
/// Output is held back until the not-found policy can no longer reject the
/// opening text, so hedges and very short replies only ever show the fallback.
pub async fn stream_answer(chat: &Chat, session: &mut Session, question: &str) -> Result<Vec<String>> {
    let pending = chat.ask_stream(session, question).await;
    let mut stdout = std::io::stdout();
    let mut gate = StreamGate::new();

    let failure = {
        let mut fragments = chat.fragments(&pending);
        let mut failure = None;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(fragment) => {
                    if let Some(visible) = gate.push(&fragment) {
                        write!(stdout, "{visible}")?;
                        stdout.flush()?;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        failure
    };

    if let Some(e) = failure {
        if gate.is_released() {
            writeln!(stdout)?;
        }
        println!("{}", style(generation_error_text(&e)).red());
        return Ok(Vec::new());
    }

    let sources = pending.sources.clone();
    let released = gate.is_released();
    let shown = chat.finish_stream(session, pending, gate.text());
    if released {
        writeln!(stdout)?;
    }
    if shown == gate.text() {
        if !released {
            println!("{shown}");
        }
        return Ok(sources);
    }
    // A hedge after the released prefix still replaces the answer.
    println!("{}", style(&shown).yellow());
    Ok(Vec::new())
}

pub fn print_answer(answer: &ChatAnswer) {
    if answer.grounded {
        println!("{}", answer.answer);
        print_sources(&answer.sources);
    } else {
        println!("{}", style(&answer.answer).yellow());
    }
}

pub fn print_sources(sources: &[String]) {
    if sources.is_empty() {
        return;
    }
    println!();
    println!("{} {}", style("Sources:").dim(), sources.join(", "));
}
