//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod clear_failed;
pub mod run;
pub mod status;

use anyhow::Result;
use clap::Subcommand;

use super::Context;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild every package that needs it
    Run {
        /// Force a rebuild of this package (repeatable)
        #[arg(long = "rebuild", value_name = "PACKAGE")]
        rebuild: Vec<String>,

        /// Print what would be built without building or saving anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the last processed revision and failed packages
    Status,

    /// Forget that packages failed so the next run retries them
    ClearFailed {
        /// Packages to clear
        #[arg(required = true)]
        packages: Vec<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, ctx: &Context) -> Result<()> {
        match self {
            Self::Run { rebuild, dry_run } => run::execute(ctx, rebuild, dry_run).await,
            Self::Status => status::execute(ctx),
            Self::ClearFailed { packages } => clear_failed::execute(ctx, &packages),
        }
    }
}
