//! Build step contract
//!
//! The scheduler hands every package to a [`BuildStep`] together with an
//! explicit [`BuildContext`]. No build state lives outside the context.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::config::BindMount;
use crate::core::dependency::Dependency;
use crate::core::recipe::Recipe;
use crate::core::version::VersionState;

/// Everything a build step learns about the package it builds
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Recipe of the package being built
    pub recipe: &'a dyn Recipe,
    /// Old/new version pair, if the version checker knows the package
    pub versions: Option<&'a VersionState>,
    /// Direct dependencies of the package
    pub dependencies: &'a [Dependency],
    /// Host paths made available inside the build sandbox
    pub bind_mounts: &'a [BindMount],
    /// Wall-clock limit for the build process
    pub time_limit: Duration,
}

impl<'a> BuildContext<'a> {
    /// Package being built
    pub fn name(&self) -> &'a str {
        self.recipe.name()
    }

    /// Directory the build runs in
    pub fn directory(&self) -> &'a Path {
        self.recipe.directory()
    }

    /// Previously recorded version
    pub fn old_version(&self) -> Option<&'a str> {
        self.versions.and_then(|v| v.old.as_deref())
    }

    /// Version detected this run
    pub fn new_version(&self) -> Option<&'a str> {
        self.versions.and_then(|v| v.new.as_deref())
    }
}

/// Why a build did not produce a published package
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildFailure {
    /// Dependencies expected to be built are not available
    #[error("missing dependencies: {}", join(.0))]
    MissingDependencies(BTreeSet<String>),

    /// The build exceeded its time limit and was killed
    #[error("build timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Any other build or post-processing error
    #[error("{0}")]
    Failed(String),
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Performs the build of a single package
///
/// Success must include post-processing (signing, publishing): the package
/// is only counted as built when `build` returns `Ok`.
#[allow(async_fn_in_trait)]
pub trait BuildStep {
    async fn build(&self, ctx: &BuildContext<'_>) -> Result<(), BuildFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        let missing: BTreeSet<String> = ["b", "a"].iter().map(ToString::to_string).collect();
        assert_eq!(
            BuildFailure::MissingDependencies(missing).to_string(),
            "missing dependencies: a, b"
        );
        assert_eq!(
            BuildFailure::Timeout(Duration::from_secs(90)).to_string(),
            "build timed out after 90s"
        );
    }
}
