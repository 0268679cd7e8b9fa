//! CLI implementation for `repobuild status`

use anyhow::{Context as _, Result};
use serde_json::json;

use crate::cli::output::state_lines;
use crate::cli::Context;
use crate::config::defaults::LOCK_FILE;
use crate::infra::lock::read_holder;
use crate::infra::store::StateStore;

/// Execute the status command
///
/// Reads the state without taking the lock.
pub fn execute(ctx: &Context) -> Result<()> {
    let store = StateStore::new(&ctx.state_dir);
    let state = store
        .load()
        .with_context(|| format!("Failed to read state from {}", store.path().display()))?;
    let holder = read_holder(&ctx.state_dir.join(LOCK_FILE));

    if ctx.output.json {
        let value = json!({
            "last_revision": state.last_revision,
            "failed": state.failed,
            "lock_holder": holder,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for line in state_lines(&state) {
        println!("{line}");
    }
    if let Some(holder) = holder {
        println!("Last run: {holder}");
    }
    Ok(())
}
