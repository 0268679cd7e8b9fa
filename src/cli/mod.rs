//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use std::path::PathBuf;

use commands::Commands;
use output::OutputConfig;

use crate::core::config::Config;
use crate::infra::dirs::RepobuildDirs;

/// repobuild - continuous build orchestrator for package repositories
///
/// Decides which packages need rebuilding, builds them in dependency order
/// and remembers failures across runs.
#[derive(Parser, Debug)]
#[command(name = "repobuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file
    #[arg(long, global = true, env = "REPOBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Package repository (overrides the configured path)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub repository: PathBuf,
    pub state_dir: PathBuf,
    pub output: OutputConfig,
}

impl Cli {
    /// Output settings requested on the command line
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig::new(self.quiet, self.json, self.verbose)
    }

    /// Resolve configuration, repository and state directory
    pub fn context(&self) -> Result<Context> {
        let dirs = RepobuildDirs::new();
        let config = match &self.config {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file '{}' does not exist", path.display());
                }
                Config::load_from_path(path)?
            }
            None => Config::load(&dirs)?,
        };

        let current_dir = std::env::current_dir().context("Failed to determine current directory")?;
        let repository = self
            .repo
            .clone()
            .unwrap_or_else(|| config.repository_path(&current_dir));
        let state_dir = config.state_dir(&dirs);

        Ok(Context {
            config,
            repository,
            state_dir,
            output: self.output_config(),
        })
    }

    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let ctx = self.context()?;
        tracing::debug!(
            repository = %ctx.repository.display(),
            state_dir = %ctx.state_dir.display(),
            "resolved context"
        );
        self.command.run(&ctx).await
    }
}
