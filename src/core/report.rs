//! Failure reports
//!
//! Every failure is reported to the package maintainers, or to the operator
//! when nobody maintains the package. Delivery problems are logged and never
//! interrupt a run.

use serde::{Deserialize, Serialize};

use crate::core::recipe::Recipe;
use crate::error::ReportError;

/// A human-readable report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Package the report is about, `None` for run-level reports
    pub package: Option<String>,
    /// Intended recipients, empty means "the operator"
    pub recipients: Vec<String>,
    /// One-line summary
    pub subject: String,
    /// Details
    pub body: String,
}

impl Report {
    /// Report about a package with a loaded recipe
    pub fn for_recipe(recipe: &dyn Recipe, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            package: Some(recipe.name().to_string()),
            recipients: recipe.maintainers().to_vec(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Report about a package known only by name
    pub fn for_package(name: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            package: Some(name.to_string()),
            recipients: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Run-level report for the operator
    pub fn for_operator(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            package: None,
            recipients: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Delivers reports
pub trait Reporter {
    fn report(&self, report: &Report) -> Result<(), ReportError>;
}

/// Deliver `report`, logging instead of propagating delivery failures
pub fn deliver(reporter: &dyn Reporter, report: &Report) {
    if let Err(e) = reporter.report(report) {
        tracing::warn!(
            package = report.package.as_deref().unwrap_or("-"),
            subject = %report.subject,
            error = %e,
            "failed to deliver report"
        );
    }
}
