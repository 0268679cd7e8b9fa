//! Command-based build step
//!
//! Runs the build command inside the package directory, then signs and
//! publishes the artifacts it produced. Artifacts left over from earlier
//! builds are not republished. A package only counts as built once its new
//! artifacts are in the destination.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::defaults::LOGS_DIR;
use crate::core::build::{BuildContext, BuildFailure, BuildStep};
use crate::core::config::Config;
use crate::core::dependency::DependencyRef;
use crate::infra::filesystem;
use crate::infra::process::{self, ProcessOutcome};
use crate::infra::sandbox::{Sandbox, SandboxError};

/// Builds packages by running a command
#[derive(Debug, Clone)]
pub struct CommandBuildStep {
    command: Vec<String>,
    sign_command: Option<Vec<String>>,
    artifact_suffixes: Vec<String>,
    destination: PathBuf,
    logs_dir: PathBuf,
    sandbox: Option<Sandbox>,
}

impl CommandBuildStep {
    /// Build step running `command`, publishing into `destination`
    pub fn new(
        command: Vec<String>,
        artifact_suffixes: Vec<String>,
        destination: PathBuf,
        logs_dir: PathBuf,
    ) -> Self {
        Self {
            command,
            sign_command: None,
            artifact_suffixes,
            destination,
            logs_dir,
            sandbox: None,
        }
    }

    /// Build step configured by `config`
    pub fn from_config(config: &Config, repository: &Path, state_dir: &Path) -> Result<Self, SandboxError> {
        let mut step = Self::new(
            config.build_command(),
            config.artifact_suffixes(),
            config.destination(repository),
            state_dir.join(LOGS_DIR),
        );
        if let Some(sign) = &config.build.sign_command {
            step = step.with_sign_command(sign.clone());
        }
        if config.build.sandbox.enabled {
            step = step.with_sandbox(Sandbox::from_settings(&config.build.sandbox)?);
        }
        Ok(step)
    }

    /// Sign every artifact with `command` (artifact path appended)
    #[must_use]
    pub fn with_sign_command(mut self, command: Vec<String>) -> Self {
        self.sign_command = Some(command);
        self
    }

    /// Run builds inside `sandbox`
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Build log of `package`
    pub fn log_path(&self, package: &str) -> PathBuf {
        self.logs_dir.join(format!("{package}.log"))
    }

    fn command_for(&self, ctx: &BuildContext<'_>, container: &str) -> Vec<String> {
        let command = ctx.recipe.build_command().unwrap_or(self.command.as_slice());
        match &self.sandbox {
            Some(sandbox) => sandbox.wrap(command, container, ctx.directory(), ctx.bind_mounts),
            None => command.to_vec(),
        }
    }

    /// Artifacts currently in `dir` with their modification times
    fn artifacts_in(&self, dir: &Path) -> BTreeMap<PathBuf, Option<SystemTime>> {
        filesystem::find_all_artifacts(dir, &self.artifact_suffixes)
            .into_iter()
            .map(|path| {
                let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
                (path, modified)
            })
            .collect()
    }

    async fn sign(&self, artifact: &Path, cwd: &Path) -> Result<Option<PathBuf>, BuildFailure> {
        let Some(sign) = &self.sign_command else {
            return Ok(None);
        };

        let mut command = sign.clone();
        command.push(artifact.display().to_string());

        let (status, output) = process::run_captured(&command, cwd)
            .await
            .map_err(|e| BuildFailure::Failed(format!("failed to run signing command: {e}")))?;
        if !status.success() {
            return Err(BuildFailure::Failed(format!(
                "signing {} failed ({status}): {}",
                artifact.display(),
                output.trim()
            )));
        }

        let mut signature = artifact.as_os_str().to_owned();
        signature.push(".sig");
        let signature = PathBuf::from(signature);
        Ok(signature.is_file().then_some(signature))
    }
}

impl BuildStep for CommandBuildStep {
    async fn build(&self, ctx: &BuildContext<'_>) -> Result<(), BuildFailure> {
        let missing: BTreeSet<String> = ctx
            .dependencies
            .iter()
            .filter(|dep| !dep.resolve())
            .map(|dep| dep.pkgdir().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BuildFailure::MissingDependencies(missing));
        }

        let log = self.log_path(ctx.name());
        filesystem::create_dir_all(&self.logs_dir).map_err(|e| BuildFailure::Failed(e.to_string()))?;
        let header = format!(
            "==> {} {} -> {}\n",
            ctx.name(),
            ctx.old_version().unwrap_or("-"),
            ctx.new_version().unwrap_or("-")
        );
        std::fs::write(&log, header)
            .map_err(|e| BuildFailure::Failed(format!("failed to open build log: {e}")))?;

        let container = Sandbox::container_name(ctx.name());
        let command = self.command_for(ctx, &container);
        let before = self.artifacts_in(ctx.directory());
        tracing::debug!(package = ctx.name(), command = ?command, log = %log.display(), "running build");

        match process::run_limited(&command, ctx.directory(), &log, ctx.time_limit).await {
            Ok(ProcessOutcome::Exited(status)) if status.success() => {}
            Ok(ProcessOutcome::Exited(status)) => {
                return Err(BuildFailure::Failed(format!(
                    "build exited with {status}, see {}",
                    log.display()
                )));
            }
            Ok(ProcessOutcome::TimedOut) => {
                if let Some(sandbox) = &self.sandbox {
                    sandbox.kill(&container, ctx.directory()).await;
                }
                return Err(BuildFailure::Timeout(ctx.time_limit));
            }
            Err(e) => {
                return Err(BuildFailure::Failed(format!("failed to start build: {e}")));
            }
        }

        let artifacts: Vec<PathBuf> = self
            .artifacts_in(ctx.directory())
            .into_iter()
            .filter(|(path, modified)| before.get(path) != Some(modified))
            .map(|(path, _)| path)
            .collect();
        if artifacts.is_empty() {
            return Err(BuildFailure::Failed("build produced no new artifacts".to_string()));
        }

        for artifact in &artifacts {
            let signature = self.sign(artifact, ctx.directory()).await?;
            for file in std::iter::once(artifact).chain(signature.as_ref()) {
                let published = filesystem::link_into(file, &self.destination)
                    .map_err(|e| BuildFailure::Failed(e.to_string()))?;
                tracing::debug!(package = ctx.name(), artifact = %published.display(), "published");
            }
        }

        Ok(())
    }
}
