//! Version-control seams
//!
//! The orchestrator talks to the repository through these traits only:
//! [`Vcs`] for the once-per-run pull, reset and push, [`RevisionDiff`] for
//! what changed between two revisions.

use std::collections::BTreeSet;

use crate::error::VcsError;

/// Repository working-tree operations
pub trait Vcs {
    /// Update the working tree from upstream
    fn pull(&self) -> Result<(), VcsError>;

    /// Discard local modifications
    fn reset_hard(&self) -> Result<(), VcsError>;

    /// Revision currently checked out
    fn head_revision(&self) -> Result<String, VcsError>;

    /// Publish local commits upstream
    fn push(&self) -> Result<(), VcsError>;
}

/// Changes between revisions
pub trait RevisionDiff {
    /// Packages with any change in `from..to`
    fn changed_packages(&self, from: &str, to: &str) -> Result<BTreeSet<String>, VcsError>;

    /// Whether `package` bumped its release number in `from..to`
    fn release_changed(&self, from: &str, to: &str, package: &str) -> Result<bool, VcsError>;
}
