//! Rebuild policy
//!
//! Decides which packages seed this run. Each signal is kept separately so
//! the operator can see why a package was picked.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::version::VersionReport;

/// Everything the policy looks at
pub struct PolicyInputs<'a> {
    /// Version checker output
    pub versions: &'a VersionReport,
    /// Persisted failed markers (package -> version at failure)
    pub failed: &'a BTreeMap<String, String>,
    /// Packages changed in the revision range
    pub changed: &'a BTreeSet<String>,
    /// Whether a package's release number changed in the revision range
    pub release_changed: &'a dyn Fn(&str) -> bool,
    /// Packages the operator forces for this run
    pub forced: &'a BTreeSet<String>,
}

/// Packages selected for rebuild, by reason
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSet {
    /// Upstream version changed
    pub need_update: BTreeSet<String>,
    /// Previously failed, and the version moved since the failure
    pub failed_updated: BTreeSet<String>,
    /// Previously failed, and the recipe changed
    pub need_rebuild_failed: BTreeSet<String>,
    /// Release number bumped
    pub need_rebuild_pkgrel: BTreeSet<String>,
    /// Forced rebuild
    pub rebuild: BTreeSet<String>,
}

impl SeedSet {
    /// Compute the seed set from `inputs`
    pub fn compute(inputs: &PolicyInputs<'_>) -> Self {
        let versions = inputs.versions;

        let need_update = versions
            .states
            .iter()
            .filter(|(_, state)| state.updated())
            .map(|(name, _)| name.clone())
            .collect();

        let failed_updated = inputs
            .failed
            .iter()
            .filter(|(name, marker)| {
                versions
                    .new_version(name)
                    .is_some_and(|current| current != marker.as_str())
            })
            .map(|(name, _)| name.clone())
            .collect();

        let need_rebuild_failed = inputs
            .failed
            .keys()
            .filter(|name| inputs.changed.contains(*name))
            .cloned()
            .collect();

        let need_rebuild_pkgrel = inputs
            .changed
            .iter()
            .filter(|name| !versions.unknown.contains(*name))
            .filter(|name| (inputs.release_changed)(name.as_str()))
            .cloned()
            .collect();

        let rebuild = versions
            .rebuild
            .iter()
            .chain(inputs.forced)
            .cloned()
            .collect();

        Self {
            need_update,
            failed_updated,
            need_rebuild_failed,
            need_rebuild_pkgrel,
            rebuild,
        }
    }

    /// All selected packages
    pub fn union(&self) -> BTreeSet<String> {
        self.need_update
            .iter()
            .chain(&self.failed_updated)
            .chain(&self.need_rebuild_failed)
            .chain(&self.need_rebuild_pkgrel)
            .chain(&self.rebuild)
            .cloned()
            .collect()
    }

    /// Log every signal
    pub fn log(&self) {
        for (signal, names) in [
            ("need_update", &self.need_update),
            ("failed_updated", &self.failed_updated),
            ("need_rebuild_failed", &self.need_rebuild_failed),
            ("need_rebuild_pkgrel", &self.need_rebuild_pkgrel),
            ("rebuild", &self.rebuild),
        ] {
            tracing::info!(signal, count = names.len(), packages = ?names, "rebuild signal");
        }
    }
}
