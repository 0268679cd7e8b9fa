//! Build scheduling
//!
//! Drives the build order one package at a time. A failing package never
//! stops the batch; dependents that needed it fail with a reason naming it.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::defaults::DEFAULT_TIME_LIMIT;
use crate::core::build::{BuildContext, BuildFailure, BuildStep};
use crate::core::config::BindMount;
use crate::core::recipe::{Recipe, RecipeRegistry};
use crate::core::report::{deliver, Report, Reporter};
use crate::core::state::WorkingSet;
use crate::core::version::VersionReport;
use crate::infra::build_log::{BuildLog, BuildRecord, BuildResult};

/// What happened to a package in this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Built and published
    Built,
    /// Attempted and failed
    Failed { reason: String },
    /// Not attempted because it was already failed
    Skipped,
}

/// Result of scheduling a build order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Outcome per package, in build order
    pub outcomes: Vec<(String, PackageOutcome)>,
    /// Scheduling stopped early on request
    pub cancelled: bool,
}

impl ScheduleReport {
    /// Outcome of `name`, if it was reached
    pub fn outcome(&self, name: &str) -> Option<&PackageOutcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, outcome)| outcome)
    }
}

/// Sequential build scheduler
pub struct Scheduler<'a, B> {
    builder: &'a B,
    reporter: &'a dyn Reporter,
    recipes: &'a RecipeRegistry,
    versions: &'a VersionReport,
    bind_mounts: &'a [BindMount],
    default_time_limit: Duration,
    build_log: Option<&'a BuildLog>,
}

impl<'a, B: BuildStep> Scheduler<'a, B> {
    /// Create a scheduler building `recipes` with `builder`
    pub fn new(
        builder: &'a B,
        reporter: &'a dyn Reporter,
        recipes: &'a RecipeRegistry,
        versions: &'a VersionReport,
    ) -> Self {
        Self {
            builder,
            reporter,
            recipes,
            versions,
            bind_mounts: &[],
            default_time_limit: DEFAULT_TIME_LIMIT,
            build_log: None,
        }
    }

    /// Bind mounts handed to every build
    #[must_use]
    pub fn with_bind_mounts(mut self, bind_mounts: &'a [BindMount]) -> Self {
        self.bind_mounts = bind_mounts;
        self
    }

    /// Time limit for recipes that set none
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.default_time_limit = limit;
        self
    }

    /// Record every outcome in `log`
    #[must_use]
    pub fn with_build_log(mut self, log: &'a BuildLog) -> Self {
        self.build_log = Some(log);
        self
    }

    /// Build `order`, updating `ws` as packages finish
    ///
    /// Cancellation is checked between packages; a build in progress runs
    /// to completion.
    pub async fn run(
        &self,
        order: &[String],
        ws: &mut WorkingSet,
        cancel: &CancellationToken,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        for (index, name) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    remaining = order.len() - index,
                    "cancellation requested, not scheduling further packages"
                );
                report.cancelled = true;
                break;
            }

            let outcome = if ws.failed.contains(name) {
                tracing::info!(package = %name, "skipping failed package");
                self.record(name, &PackageOutcome::Skipped, Duration::ZERO);
                PackageOutcome::Skipped
            } else {
                self.build_one(name, ws).await
            };
            report.outcomes.push((name.clone(), outcome));
        }

        tracing::info!(
            built = ws.built.len(),
            failed = ws.failed.len(),
            cancelled = report.cancelled,
            "scheduling finished"
        );
        report
    }

    async fn build_one(&self, name: &str, ws: &mut WorkingSet) -> PackageOutcome {
        let Some(recipe) = self.recipes.get(name) else {
            let reason = "no recipe loaded for package".to_string();
            tracing::warn!(package = %name, "{reason}");
            ws.failed.insert(name.to_string());
            deliver(
                self.reporter,
                &Report::for_package(name, format!("{name} failed to build"), reason.clone()),
            );
            let outcome = PackageOutcome::Failed { reason };
            self.record(name, &outcome, Duration::ZERO);
            return outcome;
        };

        let ctx = BuildContext {
            recipe: recipe.as_ref(),
            versions: self.versions.state(name),
            dependencies: recipe.dependencies(),
            bind_mounts: self.bind_mounts,
            time_limit: recipe.time_limit().unwrap_or(self.default_time_limit),
        };

        ws.attempted.insert(name.to_string());
        tracing::info!(
            package = %name,
            old_version = ctx.old_version().unwrap_or("-"),
            new_version = ctx.new_version().unwrap_or("-"),
            "building"
        );

        let started = Instant::now();
        let result = self.builder.build(&ctx).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(()) => {
                tracing::info!(package = %name, elapsed_secs = elapsed.as_secs(), "built");
                ws.built.insert(name.to_string());
                PackageOutcome::Built
            }
            Err(BuildFailure::MissingDependencies(missing)) => {
                let reason = missing_reason(&missing, &ws.failed);
                self.fail(recipe.as_ref(), &reason, ws);
                PackageOutcome::Failed { reason }
            }
            Err(failure) => {
                let reason = failure.to_string();
                self.fail(recipe.as_ref(), &reason, ws);
                PackageOutcome::Failed { reason }
            }
        };

        self.record(name, &outcome, elapsed);
        outcome
    }

    fn fail(&self, recipe: &dyn Recipe, reason: &str, ws: &mut WorkingSet) {
        let name = recipe.name();
        tracing::warn!(package = %name, reason, "build failed");
        ws.failed.insert(name.to_string());

        let old = self.versions.state(name).and_then(|v| v.old.as_deref());
        let versions = match (old, self.versions.new_version(name)) {
            (Some(old), Some(new)) => format!("\n\nVersion: {old} -> {new}"),
            (None, Some(new)) => format!("\n\nVersion: {new}"),
            _ => String::new(),
        };
        deliver(
            self.reporter,
            &Report::for_recipe(
                recipe,
                format!("{name} failed to build"),
                format!("{reason}{versions}"),
            ),
        );
    }

    fn record(&self, name: &str, outcome: &PackageOutcome, elapsed: Duration) {
        let Some(log) = self.build_log else {
            return;
        };

        let (result, reason) = match outcome {
            PackageOutcome::Built => (BuildResult::Built, None),
            PackageOutcome::Failed { reason } => (BuildResult::Failed, Some(reason.clone())),
            PackageOutcome::Skipped => (BuildResult::Skipped, None),
        };
        let state = self.versions.state(name);
        let record = BuildRecord::now(
            name,
            (
                state.and_then(|s| s.old.as_deref()),
                state.and_then(|s| s.new.as_deref()),
            ),
            result,
            reason,
            elapsed,
        );

        if let Err(e) = log.append(&record) {
            tracing::warn!(package = %name, error = %e, "failed to write build log");
        }
    }
}

/// Explain a missing-dependency failure, naming failed dependencies first
fn missing_reason(missing: &BTreeSet<String>, failed: &BTreeSet<String>) -> String {
    let failed_deps: Vec<&str> = missing
        .iter()
        .filter(|name| failed.contains(*name))
        .map(String::as_str)
        .collect();

    if failed_deps.is_empty() {
        BuildFailure::MissingDependencies(missing.clone()).to_string()
    } else {
        format!("depends on failed packages: {}", failed_deps.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fakes::{FakeRecipe, FakeRepo, RecordingReporter, ScriptedBuildStep};
    use tempfile::TempDir;

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_failed_dependency_fails_dependent_with_reason() {
        let repo = FakeRepo::new(vec![
            FakeRecipe::new("a").maintained_by("alice@example.org"),
            FakeRecipe::new("b").depends_on("a"),
        ]);
        let recipes = repo.registry();
        let builder = ScriptedBuildStep::new().failing("a", "compile error");
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions);

        let mut ws = WorkingSet::default();
        let report = scheduler
            .run(&order(&["a", "b"]), &mut ws, &CancellationToken::new())
            .await;

        assert_eq!(builder.attempts(), vec!["a", "b"]);
        assert_eq!(
            report.outcome("b"),
            Some(&PackageOutcome::Failed {
                reason: "depends on failed packages: a".to_string()
            })
        );
        assert!(ws.built.is_empty());
        assert_eq!(ws.failed.len(), 2);

        let reports = reporter.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].recipients, vec!["alice@example.org"]);
        assert!(reports[1].body.contains("a"));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let repo = FakeRepo::new(vec![
            FakeRecipe::new("a"),
            FakeRecipe::new("b"),
            FakeRecipe::new("c"),
        ]);
        let recipes = repo.registry();
        let builder = ScriptedBuildStep::new().failing("b", "boom");
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions);

        let mut ws = WorkingSet::default();
        scheduler
            .run(&order(&["a", "b", "c"]), &mut ws, &CancellationToken::new())
            .await;

        assert_eq!(ws.built, ["a", "c"].iter().map(ToString::to_string).collect());
        assert_eq!(ws.failed, ["b"].iter().map(ToString::to_string).collect());
    }

    #[tokio::test]
    async fn test_already_failed_is_skipped() {
        let repo = FakeRepo::new(vec![FakeRecipe::new("a"), FakeRecipe::new("b").depends_on("a")]);
        let recipes = repo.registry();
        let builder = ScriptedBuildStep::new();
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions);

        let mut ws = WorkingSet::default();
        ws.failed.insert("a".to_string());
        let report = scheduler
            .run(&order(&["a", "b"]), &mut ws, &CancellationToken::new())
            .await;

        assert_eq!(report.outcome("a"), Some(&PackageOutcome::Skipped));
        assert_eq!(builder.attempts(), vec!["b"]);
        assert!(!ws.attempted.contains("a"));
    }

    #[tokio::test]
    async fn test_cancellation_between_packages() {
        let repo = FakeRepo::new(vec![FakeRecipe::new("a"), FakeRecipe::new("b"), FakeRecipe::new("c")]);
        let recipes = repo.registry();
        let cancel = CancellationToken::new();
        let builder = ScriptedBuildStep::new().cancelling_after("a", cancel.clone());
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions);

        let mut ws = WorkingSet::default();
        let report = scheduler.run(&order(&["a", "b", "c"]), &mut ws, &cancel).await;

        assert!(report.cancelled);
        assert_eq!(builder.attempts(), vec!["a"]);
        assert_eq!(ws.built, ["a"].iter().map(ToString::to_string).collect());
        assert!(ws.failed.is_empty());
        assert!(report.outcome("b").is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let repo = FakeRepo::new(vec![FakeRecipe::new("slow").time_limit(Duration::from_secs(5))]);
        let recipes = repo.registry();
        let builder = ScriptedBuildStep::new().timing_out("slow");
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions);

        let mut ws = WorkingSet::default();
        let report = scheduler
            .run(&order(&["slow"]), &mut ws, &CancellationToken::new())
            .await;

        assert_eq!(
            report.outcome("slow"),
            Some(&PackageOutcome::Failed {
                reason: "build timed out after 5s".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_outcomes_are_logged() {
        let dir = TempDir::new().unwrap();
        let log = BuildLog::new(dir.path().join("build-log.jsonl"));
        let repo = FakeRepo::new(vec![FakeRecipe::new("a"), FakeRecipe::new("b")]);
        let recipes = repo.registry();
        let builder = ScriptedBuildStep::new().failing("b", "boom");
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions).with_build_log(&log);

        let mut ws = WorkingSet::default();
        scheduler
            .run(&order(&["a", "b"]), &mut ws, &CancellationToken::new())
            .await;

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].result, BuildResult::Built);
        assert_eq!(records[1].reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_unmanaged_dependency_fails_at_build_time() {
        let repo = FakeRepo::new(vec![FakeRecipe::new("c").depends_on_external("libfoo")]);
        let recipes = repo.registry();
        let builder = ScriptedBuildStep::new();
        let reporter = RecordingReporter::default();
        let versions = VersionReport::default();
        let scheduler = Scheduler::new(&builder, &reporter, &recipes, &versions);

        let mut ws = WorkingSet::default();
        let report = scheduler
            .run(&order(&["c"]), &mut ws, &CancellationToken::new())
            .await;

        assert_eq!(
            report.outcome("c"),
            Some(&PackageOutcome::Failed {
                reason: "missing dependencies: libfoo".to_string()
            })
        );
        assert!(reporter.reports()[0].recipients.is_empty());
    }

    #[test]
    fn test_missing_reason_without_failed_dependency() {
        let missing: BTreeSet<String> = ["x"].iter().map(ToString::to_string).collect();
        assert_eq!(
            missing_reason(&missing, &BTreeSet::new()),
            "missing dependencies: x"
        );
    }
}
