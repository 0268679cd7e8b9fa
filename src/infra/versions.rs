//! File-based version checker
//!
//! An external upstream checker writes `new_versions.json`; repobuild keeps
//! the versions it has seen in `old_versions.json`. Taking a package copies
//! its entry from the new file to the old one.
//!
//! ```json
//! { "foo": "1.2", "bar": null, "baz": { "version": "3.0", "rebuild": true } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::defaults::{NEW_VERSIONS_FILE, OLD_VERSIONS_FILE};
use crate::core::recipe::RecipeRegistry;
use crate::core::version::{VersionChecker, VersionReport, VersionState};
use crate::error::VersionError;
use crate::infra::filesystem;

/// An entry of `new_versions.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NewVersion {
    /// Plain version
    Version(String),
    /// Version with extra flags
    Detailed {
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        rebuild: bool,
    },
}

impl NewVersion {
    fn version(&self) -> Option<&str> {
        match self {
            Self::Version(version) => Some(version),
            Self::Detailed { version, .. } => version.as_deref(),
        }
    }

    fn rebuild(&self) -> bool {
        matches!(self, Self::Detailed { rebuild: true, .. })
    }
}

type OldVersions = BTreeMap<String, String>;
type NewVersions = BTreeMap<String, Option<NewVersion>>;

/// Version checker reading JSON files from the state directory
#[derive(Debug, Clone)]
pub struct JsonVersionChecker {
    old_path: PathBuf,
    new_path: PathBuf,
}

impl JsonVersionChecker {
    /// Checker using the version files in `state_dir`
    pub fn new(state_dir: &Path) -> Self {
        Self {
            old_path: state_dir.join(OLD_VERSIONS_FILE),
            new_path: state_dir.join(NEW_VERSIONS_FILE),
        }
    }

    fn read_old(&self) -> Result<OldVersions, VersionError> {
        read_json(&self.old_path)
    }

    fn read_new(&self) -> Result<NewVersions, VersionError> {
        if !self.new_path.exists() {
            tracing::warn!(path = %self.new_path.display(), "no upstream versions, every package is unknown");
        }
        read_json(&self.new_path)
    }
}

fn read_json<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T, VersionError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(VersionError::ReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })
        }
    };

    serde_json::from_str(&content).map_err(|e| VersionError::ParseError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

impl VersionChecker for JsonVersionChecker {
    fn check(&self, recipes: &RecipeRegistry) -> Result<VersionReport, VersionError> {
        let old = self.read_old()?;
        let new = self.read_new()?;
        let mut report = VersionReport::default();

        for name in recipes.keys() {
            let entry = new.get(name).and_then(Option::as_ref);
            let mut state = VersionState::new(
                old.get(name).map(String::as_str),
                entry.and_then(NewVersion::version),
            );
            state.rebuild = entry.is_some_and(NewVersion::rebuild);

            if state.new.is_none() {
                report.unknown.insert(name.clone());
            }
            if state.rebuild {
                report.rebuild.insert(name.clone());
            }
            report.states.insert(name.clone(), state);
        }

        tracing::info!(
            packages = report.states.len(),
            unknown = report.unknown.len(),
            "versions checked"
        );
        Ok(report)
    }

    fn take(&self, names: &BTreeSet<String>) -> Result<(), VersionError> {
        if names.is_empty() {
            return Ok(());
        }

        let mut old = self.read_old()?;
        let new = self.read_new()?;

        for name in names {
            if let Some(version) = new.get(name).and_then(Option::as_ref).and_then(NewVersion::version) {
                tracing::debug!(package = %name, version, "taking version");
                old.insert(name.clone(), version.to_string());
            }
        }

        let write_error = |error: String| VersionError::WriteError {
            path: self.old_path.clone(),
            error,
        };
        let json = serde_json::to_vec_pretty(&old).map_err(|e| write_error(e.to_string()))?;
        filesystem::write_atomic(&self.old_path, &json).map_err(|e| write_error(e.to_string()))
    }
}
