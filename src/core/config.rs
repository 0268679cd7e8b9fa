//! Configuration management
//!
//! Reads settings from a TOML file. Every section is optional and falls back
//! to the values in [`crate::config::defaults`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::defaults;
use crate::core::state::TakePolicy;
use crate::error::ConfigError;
use crate::infra::dirs::RepobuildDirs;

/// Top-level repobuild configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repository settings
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// State directory settings
    #[serde(default)]
    pub state: StateConfig,

    /// Build step settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Rebuild policy settings
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Version-control settings
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

/// Repository settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root of the package repository
    pub path: Option<PathBuf>,

    /// Directory successful builds are linked into
    pub destination: Option<PathBuf>,
}

/// State directory settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding state, lock, version files, logs and reports
    pub dir: Option<PathBuf>,
}

/// Build step settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build command run inside the package directory
    pub command: Option<Vec<String>>,

    /// Per-package time limit when the recipe sets none
    pub time_limit_hours: Option<f64>,

    /// Signing command, the artifact path is appended
    pub sign_command: Option<Vec<String>>,

    /// Suffixes identifying built artifacts
    pub artifact_suffixes: Option<Vec<String>>,

    /// Container sandbox
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

/// Container sandbox settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Run builds inside a container
    #[serde(default)]
    pub enabled: bool,

    /// Container image
    pub image: Option<String>,

    /// Allow network access during builds
    #[serde(default)]
    pub network: bool,

    /// Bind mounts made available to every build
    #[serde(default)]
    pub bind_mounts: Vec<BindMount>,
}

impl SandboxSettings {
    /// Effective container image
    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or(defaults::DEFAULT_SANDBOX_IMAGE)
    }
}

/// A host path mounted into the build sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Host path
    pub host: PathBuf,
    /// Path inside the sandbox
    pub container: PathBuf,
    /// Mount read-only
    #[serde(default)]
    pub read_only: bool,
}

/// Rebuild policy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Which packages get their new version recorded as seen
    pub take: Option<TakePolicy>,
}

/// Version-control settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Pull before the run
    pub pull: Option<bool>,
    /// Push after the run
    pub push: Option<bool>,
    /// Hard-reset the working tree after the run
    pub reset: Option<bool>,
}

impl VcsConfig {
    /// Pull before the run, on by default
    pub fn pull(&self) -> bool {
        self.pull.unwrap_or(true)
    }

    /// Push after the run, off by default
    pub fn push(&self) -> bool {
        self.push.unwrap_or(false)
    }

    /// Reset after the run, on by default
    pub fn reset(&self) -> bool {
        self.reset.unwrap_or(true)
    }
}

/// Report settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Recipient for reports without a known maintainer
    pub operator: Option<String>,
}

impl Config {
    /// Load configuration from the platform config directory
    ///
    /// Returns the default configuration if no config file exists.
    pub fn load(dirs: &RepobuildDirs) -> Result<Self, ConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the default configuration; an invalid one is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate().map_err(|error| ConfigError::Invalid {
            path: path.to_path_buf(),
            error,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(hours) = self.build.time_limit_hours {
            if hours_to_duration(hours).is_none() {
                return Err(format!(
                    "build.time_limit_hours must be a positive number of hours, got {hours}"
                ));
            }
        }
        Ok(())
    }

    /// Repository root, falling back to the given directory
    #[must_use]
    pub fn repository_path(&self, fallback: &Path) -> PathBuf {
        self.repository
            .path
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }

    /// Directory holding persisted state
    #[must_use]
    pub fn state_dir(&self, dirs: &RepobuildDirs) -> PathBuf {
        self.state.dir.clone().unwrap_or_else(|| dirs.state_dir())
    }

    /// Destination directory for built artifacts
    #[must_use]
    pub fn destination(&self, repository: &Path) -> PathBuf {
        self.repository
            .destination
            .clone()
            .unwrap_or_else(|| repository.join(".repobuild").join("dest"))
    }

    /// Effective build command
    #[must_use]
    pub fn build_command(&self) -> Vec<String> {
        self.build.command.clone().unwrap_or_else(|| {
            defaults::DEFAULT_BUILD_COMMAND
                .iter()
                .map(ToString::to_string)
                .collect()
        })
    }

    /// Effective per-package time limit
    #[must_use]
    pub fn time_limit(&self) -> Duration {
        self.build
            .time_limit_hours
            .and_then(hours_to_duration)
            .unwrap_or(defaults::DEFAULT_TIME_LIMIT)
    }

    /// Effective artifact suffixes
    #[must_use]
    pub fn artifact_suffixes(&self) -> Vec<String> {
        self.build.artifact_suffixes.clone().unwrap_or_else(|| {
            defaults::DEFAULT_ARTIFACT_SUFFIXES
                .iter()
                .map(ToString::to_string)
                .collect()
        })
    }

    /// Effective take policy
    #[must_use]
    pub fn take_policy(&self) -> TakePolicy {
        self.policy.take.unwrap_or_default()
    }
}

/// Convert a fractional hour count into a duration
///
/// `None` unless `hours` is positive and fits in a [`Duration`].
#[must_use]
pub fn hours_to_duration(hours: f64) -> Option<Duration> {
    if hours <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(hours * 3600.0).ok()
}
