//! Persisted run state storage
//!
//! The state file is only ever replaced atomically; a reader sees either the
//! previous or the next complete state.

use std::path::{Path, PathBuf};

use crate::config::defaults::STATE_FILE;
use crate::core::state::RunState;
use crate::error::StateError;
use crate::infra::filesystem;

/// `state.json` inside a state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store for `state_dir`
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_FILE),
        }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or the initial state if none was saved yet
    pub fn load(&self) -> Result<RunState, StateError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no saved state, starting fresh");
                return Ok(RunState::default());
            }
            Err(e) => {
                return Err(StateError::ReadError {
                    path: self.path.clone(),
                    error: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
            path: self.path.clone(),
            error: e.to_string(),
        })
    }

    /// Replace the saved state with `state`
    pub fn save(&self, state: &RunState) -> Result<(), StateError> {
        let write_error = |error: String| StateError::WriteError {
            path: self.path.clone(),
            error,
        };

        let mut json = serde_json::to_vec_pretty(state).map_err(|e| write_error(e.to_string()))?;
        json.push(b'\n');
        filesystem::write_atomic(&self.path, &json).map_err(|e| write_error(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), failed = state.failed.len(), "state saved");
        Ok(())
    }
}
