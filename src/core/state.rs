//! Run state
//!
//! [`RunState`] survives between runs; [`WorkingSet`] lives for one run.
//! The epilogue folds a working set back into the persisted state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::defaults::EMPTY_TREE_REVISION;
use crate::core::version::VersionReport;

/// Durable record of previous runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Repository revision processed by the last completed run
    pub last_revision: String,

    /// Failed packages and the version they failed at
    #[serde(default)]
    pub failed: BTreeMap<String, String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            last_revision: EMPTY_TREE_REVISION.to_string(),
            failed: BTreeMap::new(),
        }
    }
}

impl RunState {
    /// Fold the outcome of a run into the failed markers
    ///
    /// Failed packages with a known version get that version as their
    /// marker; built packages lose theirs.
    pub fn record_outcome(&mut self, ws: &WorkingSet, versions: &VersionReport) {
        for name in &ws.failed {
            if let Some(version) = versions.new_version(name) {
                self.failed.insert(name.clone(), version.to_string());
            }
        }
        for name in &ws.built {
            if self.failed.remove(name).is_some() {
                tracing::info!(package = %name, "cleared failed marker");
            }
        }
    }

    /// Record `head` as fully processed
    pub fn advance(&mut self, head: &str) {
        tracing::info!(from = %self.last_revision, to = %head, "advancing last revision");
        self.last_revision = head.to_string();
    }
}

/// Which packages get their new version recorded as seen after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TakePolicy {
    /// Only packages that built; failures keep counting as updated
    #[default]
    Built,
    /// Every updated package; failures wait for the next change
    Updated,
}

impl TakePolicy {
    /// Packages to take after a run
    ///
    /// A cancelled run only takes updated packages it actually attempted.
    pub fn select(
        self,
        ws: &WorkingSet,
        need_update: &BTreeSet<String>,
        cancelled: bool,
    ) -> BTreeSet<String> {
        match self {
            Self::Built => ws.built.clone(),
            Self::Updated => need_update
                .iter()
                .filter(|name| !cancelled || ws.attempted.contains(*name))
                .chain(&ws.built)
                .cloned()
                .collect(),
        }
    }
}

/// Per-run mutable state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    /// Packages queued for this run
    pub building: BTreeSet<String>,
    /// Packages considered failed in this run
    pub failed: BTreeSet<String>,
    /// Packages built in this run
    pub built: BTreeSet<String>,
    /// Packages handed to the build step in this run
    pub attempted: BTreeSet<String>,
}

impl WorkingSet {
    /// Start a run with the persisted failures that are not retried now
    pub fn seeded(persisted: &BTreeMap<String, String>, retrying: &BTreeSet<String>) -> Self {
        Self {
            failed: persisted
                .keys()
                .filter(|name| !retrying.contains(*name))
                .cloned()
                .collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::VersionState;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn versions(entries: &[(&str, &str)]) -> VersionReport {
        let mut report = VersionReport::default();
        for (name, new) in entries {
            report
                .states
                .insert((*name).to_string(), VersionState::new(None, Some(*new)));
        }
        report
    }

    #[test]
    fn test_default_state() {
        let state = RunState::default();
        assert_eq!(state.last_revision, EMPTY_TREE_REVISION);
        assert!(state.failed.is_empty());
    }

    #[test]
    fn test_success_clears_stale_marker() {
        let mut state = RunState::default();
        state.failed.insert("p".to_string(), "0.9".to_string());

        let ws = WorkingSet {
            built: set(&["p"]),
            ..WorkingSet::default()
        };
        state.record_outcome(&ws, &versions(&[("p", "1.0")]));

        assert!(state.failed.is_empty());
    }

    #[test]
    fn test_failure_records_current_version() {
        let mut state = RunState::default();
        state.failed.insert("old".to_string(), "1.0".to_string());

        let ws = WorkingSet {
            failed: set(&["new", "old", "unknown"]),
            ..WorkingSet::default()
        };
        state.record_outcome(&ws, &versions(&[("new", "2.0"), ("old", "1.1")]));

        assert_eq!(state.failed.get("new").map(String::as_str), Some("2.0"));
        assert_eq!(state.failed.get("old").map(String::as_str), Some("1.1"));
        assert!(!state.failed.contains_key("unknown"));
    }

    #[test]
    fn test_seeded_excludes_retried_packages() {
        let persisted: BTreeMap<String, String> = [("a", "1"), ("b", "1")]
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        let ws = WorkingSet::seeded(&persisted, &set(&["a"]));
        assert_eq!(ws.failed, set(&["b"]));
    }

    #[test]
    fn test_take_policies() {
        let ws = WorkingSet {
            built: set(&["a"]),
            failed: set(&["b"]),
            attempted: set(&["a", "b"]),
            ..WorkingSet::default()
        };
        let need_update = set(&["a", "b", "c"]);

        assert_eq!(TakePolicy::Built.select(&ws, &need_update, false), set(&["a"]));
        assert_eq!(
            TakePolicy::Updated.select(&ws, &need_update, false),
            set(&["a", "b", "c"])
        );
        assert_eq!(
            TakePolicy::Updated.select(&ws, &need_update, true),
            set(&["a", "b"])
        );
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = RunState::default();
        state.failed.insert("x".to_string(), "1.0".to_string());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["failed"]["x"], "1.0");
        assert_eq!(json["last_revision"], EMPTY_TREE_REVISION);
    }
}
