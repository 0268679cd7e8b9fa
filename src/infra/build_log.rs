//! Append-only build record
//!
//! One JSON object per line, one line per scheduled package.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result column of a build record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildResult {
    Built,
    Failed,
    Skipped,
}

/// A single line of the build log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub package: String,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
    pub result: BuildResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub elapsed_secs: f64,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

impl BuildRecord {
    /// Create a record stamped with the current time
    pub fn now(
        package: &str,
        versions: (Option<&str>, Option<&str>),
        result: BuildResult,
        reason: Option<String>,
        elapsed: Duration,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            package: package.to_string(),
            old_version: versions.0.map(ToString::to_string),
            new_version: versions.1.map(ToString::to_string),
            result,
            reason,
            elapsed_secs: elapsed.as_secs_f64(),
            timestamp,
        }
    }
}

/// Build log file
#[derive(Debug, Clone)]
pub struct BuildLog {
    path: PathBuf,
}

impl BuildLog {
    /// Build log stored at `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record
    pub fn append(&self, record: &BuildRecord) -> Result<(), FilesystemError> {
        let write_error = |error: String| FilesystemError::WriteFile {
            path: self.path.clone(),
            error,
        };

        if let Some(parent) = self.path.parent() {
            filesystem::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(record).map_err(|e| write_error(e.to_string()))?;
        line.push('\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| write_error(e.to_string()))
    }

    /// Read every well-formed record, skipping damaged lines
    pub fn records(&self) -> Vec<BuildRecord> {
        let Ok(file) = std::fs::File::open(&self.path) else {
            return Vec::new();
        };

        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }
}
