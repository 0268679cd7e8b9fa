//! Upstream version tracking
//!
//! The version checker reports, per package, the version recorded last time
//! and the version detected now. Packages whose current version cannot be
//! determined are "unknown".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::recipe::RecipeRegistry;
use crate::error::VersionError;

/// Version information for one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionState {
    /// Version recorded as seen
    pub old: Option<String>,
    /// Version detected this run
    pub new: Option<String>,
    /// Checker requests a rebuild regardless of version
    #[serde(default)]
    pub rebuild: bool,
}

impl VersionState {
    /// Create a state from an old/new pair
    pub fn new(old: Option<&str>, new: Option<&str>) -> Self {
        Self {
            old: old.map(ToString::to_string),
            new: new.map(ToString::to_string),
            rebuild: false,
        }
    }

    /// Whether a known new version differs from the recorded one
    pub fn updated(&self) -> bool {
        self.new.is_some() && self.new != self.old
    }
}

/// Output of a version check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionReport {
    /// Per-package version states
    pub states: BTreeMap<String, VersionState>,
    /// Packages whose current version could not be determined
    pub unknown: BTreeSet<String>,
    /// Packages flagged for unconditional rebuild
    pub rebuild: BTreeSet<String>,
}

impl VersionReport {
    /// Version state of `name`
    pub fn state(&self, name: &str) -> Option<&VersionState> {
        self.states.get(name)
    }

    /// Current version of `name`, if known
    pub fn new_version(&self, name: &str) -> Option<&str> {
        self.states.get(name).and_then(|s| s.new.as_deref())
    }
}

/// Detects upstream versions and records them as seen
pub trait VersionChecker {
    /// Check every loaded recipe
    fn check(&self, recipes: &RecipeRegistry) -> Result<VersionReport, VersionError>;

    /// Record the current version of `names` as seen
    fn take(&self, names: &BTreeSet<String>) -> Result<(), VersionError>;
}
