//! CLI implementation for `repobuild clear-failed`
//!
//! Removes failed markers so the next run retries the packages even when
//! their version did not change.

use anyhow::{Context as _, Result};

use crate::cli::output::status;
use crate::cli::Context;
use crate::infra::lock::RunLock;
use crate::infra::store::StateStore;

/// Execute the clear-failed command
pub fn execute(ctx: &Context, packages: &[String]) -> Result<()> {
    let _lock = RunLock::acquire(&ctx.state_dir, "repobuild clear-failed")
        .context("Another run holds the state directory")?;

    let store = StateStore::new(&ctx.state_dir);
    let mut state = store
        .load()
        .with_context(|| format!("Failed to read state from {}", store.path().display()))?;

    let mut cleared = Vec::new();
    for name in packages {
        match state.failed.remove(name) {
            Some(version) => {
                tracing::info!(package = %name, version = %version, "cleared failed marker");
                cleared.push(name.as_str());
            }
            None if !ctx.output.quiet => {
                println!("{} {name} is not marked as failed", status::INFO);
            }
            None => {}
        }
    }

    if cleared.is_empty() {
        return Ok(());
    }

    store.save(&state).context("Failed to save state")?;
    if !ctx.output.quiet {
        for name in cleared {
            println!("{} Cleared {name}", status::SUCCESS);
        }
    }
    Ok(())
}
