//! Error types for repobuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Circular dependency detected among packages of the build closure
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Recipe loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    /// Recipe file could not be read
    #[error("Failed to read recipe '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Recipe file is not valid
    #[error("Failed to parse recipe '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// Recipe declares something the orchestrator cannot honor
    #[error("Invalid recipe for '{package}': {message}")]
    Invalid { package: String, message: String },
}

/// Persisted run state errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file exists but cannot be read
    #[error("Failed to read state file '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// State file exists but is not valid
    #[error("State file '{path}' is corrupt: {error}")]
    Corrupt { path: PathBuf, error: String },

    /// State file could not be written
    #[error("Failed to write state file '{path}': {error}")]
    WriteError { path: PathBuf, error: String },
}

/// Run lock errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Another run holds the lock
    #[error("Another repobuild run is active (lock held on '{path}'{})", holder.as_ref().map(|h| format!(" by {h}")).unwrap_or_default())]
    Contention { path: PathBuf, holder: Option<String> },

    /// Lock file could not be opened or locked
    #[error("Failed to lock '{path}': {error}")]
    LockFailed { path: PathBuf, error: String },
}

/// Version checker errors
#[derive(Error, Debug)]
pub enum VersionError {
    /// Version file could not be read
    #[error("Failed to read version file '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Version file is not valid
    #[error("Failed to parse version file '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// Version file could not be written
    #[error("Failed to write version file '{path}': {error}")]
    WriteError { path: PathBuf, error: String },
}

/// Version-control errors
#[derive(Error, Debug)]
pub enum VcsError {
    /// The git executable is not available
    #[error("git executable not found in PATH")]
    GitNotFound,

    /// Repository could not be opened
    #[error("Invalid repository at '{path}': {error}")]
    InvalidRepository { path: PathBuf, error: String },

    /// A git command failed
    #[error("'git {command}' failed: {error}")]
    CommandFailed { command: String, error: String },
}

/// Report delivery errors
#[derive(Error, Debug)]
pub enum ReportError {
    /// Report could not be written to the spool
    #[error("Failed to spool report to '{path}': {error}")]
    SpoolFailed { path: PathBuf, error: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// Config file parsed but holds an unusable value
    #[error("Invalid config file '{path}': {error}")]
    Invalid { path: PathBuf, error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to link or copy an artifact
    #[error("Failed to link '{from}' to '{to}': {error}")]
    Link {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level run error
///
/// Anything in here aborts a run. Per-package failures never surface as a
/// `RunError`; they end up in the failed set instead.
#[derive(Error, Debug)]
pub enum RunError {
    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// State error
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Lock error
    #[error("{0}")]
    Lock(#[from] LockError),

    /// Version checker error
    #[error("Version check error: {0}")]
    Version(#[from] VersionError),

    /// Version-control error
    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
