//! Dependency model
//!
//! A package declares dependencies on packages of the same repository
//! (managed) or on names the repository knows nothing about (unmanaged).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::defaults::RECIPE_FILE;
use crate::infra::filesystem;

/// What the resolver needs to know about a dependency
///
/// Implemented by [`Dependency`] against the filesystem and by in-memory
/// fakes in tests.
pub trait DependencyRef {
    /// Directory (package key) the dependency lives in
    fn pkgdir(&self) -> &str;

    /// Package name the dependency refers to
    fn pkgname(&self) -> &str;

    /// Whether a built artifact for the target is already available
    fn resolve(&self) -> bool;

    /// Whether the target is a package of this repository
    fn managed(&self) -> bool;
}

/// A dependency declared by a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pkgdir: String,
    pkgname: String,
    location: PathBuf,
    artifact_suffixes: Arc<[String]>,
}

impl Dependency {
    /// Create a dependency on `pkgname` living in `repository/pkgdir`
    pub fn new(
        repository: &Path,
        pkgdir: impl Into<String>,
        pkgname: impl Into<String>,
        artifact_suffixes: Arc<[String]>,
    ) -> Self {
        let pkgdir = pkgdir.into();
        Self {
            location: repository.join(&pkgdir),
            pkgdir,
            pkgname: pkgname.into(),
            artifact_suffixes,
        }
    }

    /// Directory of the target package
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Built artifacts of the target currently present in its directory
    pub fn artifacts(&self) -> Vec<PathBuf> {
        filesystem::find_artifacts(&self.location, &self.pkgname, &self.artifact_suffixes)
    }
}

impl DependencyRef for Dependency {
    fn pkgdir(&self) -> &str {
        &self.pkgdir
    }

    fn pkgname(&self) -> &str {
        &self.pkgname
    }

    fn resolve(&self) -> bool {
        !self.artifacts().is_empty()
    }

    fn managed(&self) -> bool {
        self.location.join(RECIPE_FILE).is_file()
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.pkgdir == self.pkgname {
            write!(f, "{}", self.pkgname)
        } else {
            write!(f, "{}/{}", self.pkgdir, self.pkgname)
        }
    }
}
