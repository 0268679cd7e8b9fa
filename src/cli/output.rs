//! Output formatting
//!
//! Human-readable and JSON renderings of command results. Logging goes to
//! stderr through tracing; everything here goes to stdout.

use serde_json::json;

use crate::core::orchestrator::RunSummary;
use crate::core::state::RunState;

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Output settings from the global flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Default log filter directive
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, _) => "debug",
        }
    }
}

/// Print an error with its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// JSON rendering of a run summary
pub fn summary_json(summary: &RunSummary) -> serde_json::Value {
    json!({
        "dry_run": summary.dry_run,
        "seed": summary.seed,
        "order": summary.order,
        "built": summary.built,
        "failed": summary.failed,
        "skipped": summary.skipped,
        "problems": summary.problems,
        "cancelled": summary.cancelled,
        "advanced_to": summary.advanced_to,
        "error": summary.error.as_ref().map(ToString::to_string),
    })
}

/// Human-readable rendering of a run summary
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();

    if summary.dry_run {
        lines.push(format!("{} Selected: {}", status::INFO, join(&summary.seed)));
        lines.push(format!("{} Build order: {}", status::INFO, summary.order.join(" ")));
    }
    for name in &summary.built {
        lines.push(format!("{} {name} built", status::SUCCESS));
    }
    for (name, reason) in &summary.failed {
        lines.push(format!("{} {name} failed: {reason}", status::ERROR));
    }
    for name in &summary.skipped {
        lines.push(format!("{} {name} skipped (previously failed)", status::INFO));
    }
    for (name, missing) in &summary.problems {
        lines.push(format!(
            "{} {name} has unresolvable dependencies: {}",
            status::WARNING,
            missing.join(", ")
        ));
    }
    if summary.cancelled {
        lines.push(format!("{} Run cancelled, remaining packages not built", status::WARNING));
    }
    if let Some(revision) = &summary.advanced_to {
        lines.push(format!("{} Processed up to {revision}", status::SUCCESS));
    }
    if !summary.dry_run && summary.order.is_empty() && summary.error.is_none() {
        lines.push(format!("{} Nothing to build", status::INFO));
    }
    lines
}

/// Human-readable rendering of the persisted state
pub fn state_lines(state: &RunState) -> Vec<String> {
    let mut lines = vec![format!("Last revision: {}", state.last_revision)];
    if state.failed.is_empty() {
        lines.push(format!("{} No failed packages", status::SUCCESS));
    } else {
        lines.push(format!("Failed packages ({}):", state.failed.len()));
        for (name, version) in &state.failed {
            lines.push(format!("  {} {name} (at {version})", status::ERROR));
        }
    }
    lines
}

fn join<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let names: Vec<&str> = names.into_iter().map(String::as_str).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" ")
    }
}
