//! Git operations
//!
//! Reads the head revision with the gix crate and shells out to the `git`
//! executable for operations touching the working tree or remotes.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::vcs::{RevisionDiff, Vcs};
use crate::error::VcsError;

/// A package repository under git
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    git: PathBuf,
}

impl GitRepository {
    /// Open the repository at `path`
    pub fn open(path: &Path) -> Result<Self, VcsError> {
        let git = which::which("git").map_err(|_| VcsError::GitNotFound)?;
        gix::open(path).map_err(|e| VcsError::InvalidRepository {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            git,
        })
    }

    /// Repository root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run git with `args`, returning stdout
    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let command_failed = |error: String| VcsError::CommandFailed {
            command: args.join(" "),
            error,
        };

        tracing::debug!(args = ?args, "running git");
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(&self.path)
            .output()
            .map_err(|e| command_failed(e.to_string()))?;

        if !output.status.success() {
            return Err(command_failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Vcs for GitRepository {
    fn pull(&self) -> Result<(), VcsError> {
        self.git(&["pull", "--ff-only"]).map(drop)
    }

    fn reset_hard(&self) -> Result<(), VcsError> {
        self.git(&["reset", "--hard", "HEAD"]).map(drop)
    }

    fn head_revision(&self) -> Result<String, VcsError> {
        let invalid = |error: String| VcsError::InvalidRepository {
            path: self.path.clone(),
            error,
        };

        let repo = gix::open(&self.path).map_err(|e| invalid(e.to_string()))?;
        let commit = repo.head_commit().map_err(|e| invalid(e.to_string()))?;
        Ok(commit.id().to_hex().to_string())
    }

    fn push(&self) -> Result<(), VcsError> {
        self.git(&["push"]).map(drop)
    }
}

impl RevisionDiff for GitRepository {
    fn changed_packages(&self, from: &str, to: &str) -> Result<BTreeSet<String>, VcsError> {
        let output = self.git(&["diff", "--name-only", from, to])?;
        Ok(packages_from_paths(&output))
    }

    fn release_changed(&self, from: &str, to: &str, package: &str) -> Result<bool, VcsError> {
        let pathspec = format!("{package}/");
        let output = self.git(&["diff", "--unified=0", from, to, "--", &pathspec])?;
        Ok(release_bumped(&output))
    }
}

/// Package directories touched by a `git diff --name-only` listing
///
/// Files at the repository root belong to no package.
pub fn packages_from_paths(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('/'))
        .map(|(package, _)| package.to_string())
        .filter(|package| !package.is_empty() && !package.starts_with('.'))
        .collect()
}

/// Whether a diff replaces a release number with a different one
///
/// Recognizes `pkgrel=N` (PKGBUILD) and `release = N` (TOML recipes).
pub fn release_bumped(diff: &str) -> bool {
    let Ok(re) = Regex::new(r#"^([+-])\s*(?:pkgrel\s*=|release\s*=)\s*["']?([^"'\s#]+)"#) else {
        return false;
    };

    let mut removed = BTreeSet::new();
    let mut added = BTreeSet::new();
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            let value = caps[2].to_string();
            if &caps[1] == "+" {
                added.insert(value);
            } else {
                removed.insert(value);
            }
        }
    }

    !removed.is_empty() && added.iter().any(|value| !removed.contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packages_from_paths() {
        let output = "foo/PKGBUILD\nfoo/recipe.toml\nbar/patches/fix.patch\nREADME.md\n.github/workflows/ci.yml\n";
        let packages = packages_from_paths(output);
        assert_eq!(
            packages,
            ["bar", "foo"].iter().map(ToString::to_string).collect()
        );
    }

    #[test]
    fn test_pkgrel_bump() {
        let diff = "\
--- a/foo/PKGBUILD
+++ b/foo/PKGBUILD
@@ -3 +3 @@
-pkgrel=1
+pkgrel=2
";
        assert!(release_bumped(diff));
    }

    #[test]
    fn test_toml_release_bump() {
        let diff = "-release = \"1\"\n+release = \"2\"\n";
        assert!(release_bumped(diff));
    }

    #[test]
    fn test_unchanged_release_is_not_a_bump() {
        let diff = "-pkgrel=1 # old comment\n+pkgrel=1\n-pkgver=1.0\n+pkgver=1.1\n";
        assert!(!release_bumped(diff));
    }

    #[test]
    fn test_new_file_is_not_a_bump() {
        let diff = "--- /dev/null\n+++ b/foo/PKGBUILD\n+pkgver=1.0\n+pkgrel=1\n";
        assert!(!release_bumped(diff));
    }
}
