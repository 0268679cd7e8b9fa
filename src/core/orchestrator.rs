//! Run orchestration
//!
//! One run: lock, load state, pick packages, resolve, build, persist. Once
//! the lock is held and the state loaded, the epilogue always runs, whatever
//! happened in between.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::defaults::{BUILD_LOG_FILE, DEFAULT_TIME_LIMIT};
use crate::core::build::BuildStep;
use crate::core::config::{BindMount, Config};
use crate::core::policy::{PolicyInputs, SeedSet};
use crate::core::recipe::RecipeLoader;
use crate::core::report::{deliver, Report, Reporter};
use crate::core::resolver::{DependencyGraph, Resolution};
use crate::core::scheduler::{PackageOutcome, ScheduleReport, Scheduler};
use crate::core::state::{RunState, TakePolicy, WorkingSet};
use crate::core::vcs::{RevisionDiff, Vcs};
use crate::core::version::{VersionChecker, VersionReport};
use crate::error::RunError;
use crate::infra::build_log::BuildLog;
use crate::infra::lock::RunLock;
use crate::infra::store::StateStore;

/// External collaborators of a run
pub struct Collaborators<'a, B> {
    pub loader: &'a dyn RecipeLoader,
    pub versions: &'a dyn VersionChecker,
    pub diff: &'a dyn RevisionDiff,
    pub vcs: &'a dyn Vcs,
    pub builder: &'a B,
    pub reporter: &'a dyn Reporter,
}

/// Settings of a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Package repository root
    pub repository: PathBuf,
    /// State directory
    pub state_dir: PathBuf,
    /// Which packages get their version taken
    pub take: TakePolicy,
    /// Packages forced by the operator
    pub forced: BTreeSet<String>,
    pub pull: bool,
    pub push: bool,
    pub reset: bool,
    /// Resolve and print, build and persist nothing
    pub dry_run: bool,
    /// Bind mounts for every build
    pub bind_mounts: Vec<BindMount>,
    /// Time limit for recipes that set none
    pub time_limit: Duration,
}

impl RunOptions {
    /// Options with every switch at its default
    pub fn new(repository: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            repository,
            state_dir,
            take: TakePolicy::default(),
            forced: BTreeSet::new(),
            pull: true,
            push: false,
            reset: true,
            dry_run: false,
            bind_mounts: Vec::new(),
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    /// Options taken from `config`
    pub fn from_config(config: &Config, repository: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            take: config.take_policy(),
            pull: config.vcs.pull(),
            push: config.vcs.push(),
            reset: config.vcs.reset(),
            bind_mounts: config.build.sandbox.bind_mounts.clone(),
            time_limit: config.time_limit(),
            ..Self::new(repository, state_dir)
        }
    }
}

/// What a run did
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Packages selected by the rebuild policy
    pub seed: BTreeSet<String>,
    /// Build order
    pub order: Vec<String>,
    pub built: BTreeSet<String>,
    /// Packages that failed in this run
    pub failed: BTreeMap<String, String>,
    /// Packages skipped because they were already failed
    pub skipped: Vec<String>,
    /// Unresolvable dependencies per package
    pub problems: BTreeMap<String, Vec<String>>,
    pub cancelled: bool,
    /// Revision recorded as processed, if the run advanced it
    pub advanced_to: Option<String>,
    /// Run-level error, reported to the operator
    pub error: Option<RunError>,
    pub dry_run: bool,
}

impl RunSummary {
    /// Whether the run finished without a run-level error or cancellation
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// Everything the build phase produces, kept even when it stops early
#[derive(Default)]
struct Progress {
    head: Option<String>,
    versions: VersionReport,
    seed: SeedSet,
    seeds: BTreeSet<String>,
    load_errors: BTreeMap<String, String>,
    ws: WorkingSet,
    resolution: Resolution,
    schedule: ScheduleReport,
}

/// Runs the build pipeline once
pub struct Orchestrator<'a, B> {
    collaborators: Collaborators<'a, B>,
    options: RunOptions,
}

impl<'a, B: BuildStep> Orchestrator<'a, B> {
    pub fn new(collaborators: Collaborators<'a, B>, options: RunOptions) -> Self {
        Self {
            collaborators,
            options,
        }
    }

    /// Execute one run
    ///
    /// Only lock and state-store failures are returned as errors; anything
    /// else ends up in [`RunSummary::error`] after the epilogue ran.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, RunError> {
        let store = StateStore::new(&self.options.state_dir);

        if self.options.dry_run {
            let state = self.abort_on_error(store.load().map_err(RunError::from))?;
            let mut progress = Progress::default();
            let result = self.build_phase(&state, &mut progress, cancel).await;
            return Ok(summarize(progress, result.err(), None, true));
        }

        let _lock = self.abort_on_error(
            RunLock::acquire(&self.options.state_dir, "repobuild run").map_err(RunError::from),
        )?;
        let mut state = self.abort_on_error(store.load().map_err(RunError::from))?;

        let mut progress = Progress::default();
        let error = self.build_phase(&state, &mut progress, cancel).await.err();

        // Epilogue
        if let Some(e) = &error {
            tracing::error!(error = %e, "run failed");
            deliver(
                self.collaborators.reporter,
                &Report::for_operator("repobuild run failed", e.to_string()),
            );
        }

        state.record_outcome(&progress.ws, &progress.versions);
        self.take_versions(&progress);

        let advanced_to = match &progress.head {
            Some(head) if error.is_none() && !progress.schedule.cancelled => {
                state.advance(head);
                Some(head.clone())
            }
            _ => {
                tracing::info!(revision = %state.last_revision, "not advancing last revision");
                None
            }
        };

        let saved = store.save(&state);
        self.finish_vcs(error.is_none());
        self.abort_on_error(saved.map_err(RunError::from))?;

        Ok(summarize(progress, error, advanced_to, false))
    }

    /// Report an aborting error to the operator before returning it
    fn abort_on_error<T>(&self, result: Result<T, RunError>) -> Result<T, RunError> {
        result.map_err(|e| {
            deliver(
                self.collaborators.reporter,
                &Report::for_operator("repobuild run aborted", e.to_string()),
            );
            e
        })
    }

    async fn build_phase(
        &self,
        state: &RunState,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let c = &self.collaborators;

        if self.options.pull && !self.options.dry_run {
            c.vcs.pull()?;
        }
        let head = c.vcs.head_revision()?;
        progress.head = Some(head.clone());

        let loaded = c.loader.load(&self.options.repository);
        for (name, e) in &loaded.errors {
            self.notify(&Report::for_package(
                name,
                format!("{name} recipe failed to load"),
                e.to_string(),
            ));
            progress.load_errors.insert(name.clone(), e.to_string());
        }
        let recipes = loaded.recipes;

        progress.versions = c.versions.check(&recipes)?;
        let changed = c.diff.changed_packages(&state.last_revision, &head)?;
        tracing::info!(from = %state.last_revision, to = %head, changed = changed.len(), "revision range");

        let release_changed = |name: &str| {
            c.diff
                .release_changed(&state.last_revision, &head, name)
                .unwrap_or_else(|e| {
                    tracing::warn!(package = name, error = %e, "failed to inspect release change");
                    false
                })
        };
        progress.seed = SeedSet::compute(&PolicyInputs {
            versions: &progress.versions,
            failed: &state.failed,
            changed: &changed,
            release_changed: &release_changed,
            forced: &self.options.forced,
        });
        progress.seed.log();

        let (seeds, dropped): (BTreeSet<String>, BTreeSet<String>) = progress
            .seed
            .union()
            .into_iter()
            .partition(|name| recipes.contains_key(name));
        if !dropped.is_empty() {
            tracing::info!(packages = ?dropped, "selected packages without a loaded recipe are not built");
        }
        progress.seeds = seeds;

        progress.ws = WorkingSet::seeded(&state.failed, &progress.seeds);
        progress.ws.failed.extend(progress.load_errors.keys().cloned());

        let mut graph = DependencyGraph::new();
        for (name, recipe) in &recipes {
            graph.add_package(name, recipe.dependencies());
        }
        progress.resolution = graph.resolve(&progress.seeds)?;
        progress.ws.building.clone_from(&progress.resolution.building);

        for (name, missing) in &progress.resolution.problems {
            let body = format!("unresolvable dependencies: {}", missing.join(", "));
            tracing::warn!(package = %name, "{body}");
            let subject = format!("{name} has unresolvable dependencies");
            let report = match recipes.get(name) {
                Some(recipe) => Report::for_recipe(recipe.as_ref(), subject, body),
                None => Report::for_package(name, subject, body),
            };
            self.notify(&report);
        }

        tracing::info!(order = ?progress.resolution.order, "build order");
        if self.options.dry_run {
            return Ok(());
        }

        let build_log = BuildLog::new(self.options.state_dir.join(BUILD_LOG_FILE));
        let scheduler = Scheduler::new(c.builder, c.reporter, &recipes, &progress.versions)
            .with_bind_mounts(&self.options.bind_mounts)
            .with_time_limit(self.options.time_limit)
            .with_build_log(&build_log);
        progress.schedule = scheduler
            .run(&progress.resolution.order, &mut progress.ws, cancel)
            .await;

        Ok(())
    }

    /// Deliver a package report, unless this is a dry run
    fn notify(&self, report: &Report) {
        if !self.options.dry_run {
            deliver(self.collaborators.reporter, report);
        }
    }

    fn take_versions(&self, progress: &Progress) {
        let names = self.options.take.select(
            &progress.ws,
            &progress.seed.need_update,
            progress.schedule.cancelled,
        );
        if let Err(e) = self.collaborators.versions.take(&names) {
            tracing::error!(error = %e, "failed to record taken versions");
            deliver(
                self.collaborators.reporter,
                &Report::for_operator("repobuild failed to record versions", e.to_string()),
            );
        }
    }

    fn finish_vcs(&self, clean: bool) {
        let vcs = self.collaborators.vcs;
        if self.options.reset {
            if let Err(e) = vcs.reset_hard() {
                tracing::warn!(error = %e, "failed to reset working tree");
            }
        }
        if self.options.push && clean {
            if let Err(e) = vcs.push() {
                tracing::warn!(error = %e, "failed to push");
                deliver(
                    self.collaborators.reporter,
                    &Report::for_operator("repobuild push failed", e.to_string()),
                );
            }
        }
    }
}

fn summarize(
    progress: Progress,
    error: Option<RunError>,
    advanced_to: Option<String>,
    dry_run: bool,
) -> RunSummary {
    let mut summary = RunSummary {
        seed: progress.seeds,
        order: progress.resolution.order,
        built: progress.ws.built,
        failed: progress.load_errors,
        problems: progress.resolution.problems,
        cancelled: progress.schedule.cancelled,
        advanced_to,
        error,
        dry_run,
        ..RunSummary::default()
    };

    for (name, outcome) in progress.schedule.outcomes {
        match outcome {
            PackageOutcome::Built => {}
            PackageOutcome::Failed { reason } => {
                summary.failed.insert(name, reason);
            }
            PackageOutcome::Skipped => summary.skipped.push(name),
        }
    }
    summary
}
