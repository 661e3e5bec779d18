use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = cli::run(cli).await {
        eprintln!("{} {e}", style("error:").red().bold());
        std::process::exit(e.exit_code());
    }
}

/// `RUST_LOG` wins over `--verbose`; logs go to stderr so `--json` output stays clean.
fn init_tracing(verbose: bool) {
    let default = if verbose { "docqa=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
