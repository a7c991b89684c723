//! kp CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kp_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        if let Some(hint) = e.hint() {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}
