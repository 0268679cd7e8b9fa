//! Report spool
//!
//! Reports are logged and written as JSON files for a separate delivery
//! agent to pick up.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::report::{Report, Reporter};
use crate::error::ReportError;
use crate::infra::filesystem;

/// Reporter spooling into a directory
#[derive(Debug)]
pub struct SpoolReporter {
    dir: PathBuf,
    operator: Option<String>,
    sequence: AtomicUsize,
}

impl SpoolReporter {
    /// Spool into `dir`, sending unowned reports to `operator`
    pub fn new(dir: PathBuf, operator: Option<String>) -> Self {
        Self {
            dir,
            operator,
            sequence: AtomicUsize::new(0),
        }
    }

    /// Spool directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(&self, report: &Report) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let subject = report.package.as_deref().unwrap_or("run");
        format!("{timestamp}-{}-{sequence:04}-{subject}.json", std::process::id())
    }
}

impl Reporter for SpoolReporter {
    fn report(&self, report: &Report) -> Result<(), ReportError> {
        let mut report = report.clone();
        if report.recipients.is_empty() {
            report.recipients.extend(self.operator.iter().cloned());
        }

        tracing::warn!(
            package = report.package.as_deref().unwrap_or("-"),
            recipients = ?report.recipients,
            subject = %report.subject,
            "{}",
            report.body
        );

        let path = self.dir.join(self.file_name(&report));
        let spool_error = |error: String| ReportError::SpoolFailed {
            path: path.clone(),
            error,
        };
        let json = serde_json::to_vec_pretty(&report).map_err(|e| spool_error(e.to_string()))?;
        filesystem::write_atomic(&path, &json).map_err(|e| spool_error(e.to_string()))
    }
}
