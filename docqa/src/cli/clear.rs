use console::{Term, style};

use docqa::config::Config;
use docqa::ports::VectorIndex;
use docqa::{DocQaError, Result};

use super::open_index;

pub async fn run(config: &Config, force: bool, json: bool) -> Result<()> {
    let index = open_index(config).await?;
    let count = index.stats().await?.count;

    if !force {
        if json {
            return Err(DocQaError::Config(
                "refusing to prompt with --json, pass --force to clear".to_string(),
            ));
        }
        if !confirm(count)? {
            println!("Aborted");
            return Ok(());
        }
    }

    index.clear().await?;
    index.persist().await?;

    if json {
        println!("{}", serde_json::json!({ "cleared": count }));
    } else {
        println!("{} {count} chunks", style("Cleared").green().bold());
    }
    Ok(())
}

fn confirm(count: usize) -> Result<bool> {
    let term = Term::stdout();
    term.write_str(&format!("Remove all {count} indexed chunks? [y/N] "))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
