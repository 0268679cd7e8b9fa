//! repobuild CLI - continuous build orchestrator for package repositories
//!
//! Entry point for the repobuild command-line application.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use repobuild::cli::output::display_error;
use repobuild::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.output_config().log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run().await {
        display_error(&e);
        std::process::exit(1);
    }
}
