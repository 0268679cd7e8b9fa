//! repobuild - continuous build orchestrator for package repositories
//!
//! Watches a repository of package recipes, decides which packages need a
//! rebuild, builds them in dependency order and remembers failures so they
//! are not retried until something changes.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Business logic: policy, resolver, scheduler, run state
//! - [`infra`] - Infrastructure layer (filesystem, processes, git, locking)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
