//! CLI implementation for `repobuild run`
//!
//! Wires the default collaborators into an [`Orchestrator`] and prints the
//! outcome. Ctrl-C stops the run between packages; a second Ctrl-C kills
//! the build in progress and exits at once.

use std::future::Future;
use std::io;

use anyhow::{bail, Context as _, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::output::{status, summary_json, summary_lines};
use crate::cli::Context;
use crate::config::defaults::REPORTS_DIR;
use crate::core::orchestrator::{Collaborators, Orchestrator, RunOptions};
use crate::core::recipe::TomlRecipeLoader;
use crate::infra::builder::CommandBuildStep;
use crate::infra::git::GitRepository;
use crate::infra::process;
use crate::infra::report::SpoolReporter;
use crate::infra::versions::JsonVersionChecker;

/// Exit code after a second interrupt (128 + SIGINT)
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancel `cancel` on the first interrupt
///
/// Returns `true` once a second interrupt arrives, `false` if the interrupt
/// source fails first.
async fn watch_interrupts<F, Fut>(mut interrupted: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    tracing::warn!("interrupted, finishing the current package (interrupt again to abort)");
    cancel.cancel();

    interrupted().await.is_ok()
}

/// Execute the run command
pub async fn execute(ctx: &Context, rebuild: Vec<String>, dry_run: bool) -> Result<()> {
    let config = &ctx.config;

    let git = GitRepository::open(&ctx.repository)
        .with_context(|| format!("Failed to open repository {}", ctx.repository.display()))?;
    let loader = TomlRecipeLoader::new(config.artifact_suffixes());
    let versions = JsonVersionChecker::new(&ctx.state_dir);
    let builder = CommandBuildStep::from_config(config, &ctx.repository, &ctx.state_dir)
        .context("Failed to set up the build step")?;
    let reporter = SpoolReporter::new(ctx.state_dir.join(REPORTS_DIR), config.report.operator.clone());

    let mut options = RunOptions::from_config(config, ctx.repository.clone(), ctx.state_dir.clone());
    options.forced = rebuild.into_iter().collect();
    options.dry_run = dry_run;

    let orchestrator = Orchestrator::new(
        Collaborators {
            loader: &loader,
            versions: &versions,
            diff: &git,
            vcs: &git,
            builder: &builder,
            reporter: &reporter,
        },
        options,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, on_signal).await {
            tracing::error!("interrupted again, aborting the run");
            process::kill_descendants(std::process::id());
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let summary = orchestrator.run(&cancel).await?;

    if ctx.output.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&summary))?);
    } else if !ctx.output.quiet {
        for line in summary_lines(&summary) {
            println!("{line}");
        }
    }

    if let Some(error) = summary.error {
        bail!("Run aborted: {error}");
    }
    if summary.cancelled {
        bail!("Run cancelled");
    }
    if !summary.failed.is_empty() && !ctx.output.quiet && !ctx.output.json {
        println!("{} {} package(s) failed, see the build logs", status::WARNING, summary.failed.len());
    }
    Ok(())
}
