//! Core business logic module
//!
//! Decides what to build and in which order. Side effects happen behind the
//! collaborator traits ([`recipe::RecipeLoader`], [`version::VersionChecker`],
//! [`vcs::Vcs`], [`build::BuildStep`], [`report::Reporter`]), implemented in
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`config`] - Configuration file handling
//! - [`recipe`] - Package recipes and the recipe registry
//! - [`dependency`] - Dependency references
//! - [`version`] - Old/new version reports
//! - [`policy`] - Rebuild policy (seed set)
//! - [`resolver`] - Dependency closure and build order
//! - [`state`] - Persisted run state and the per-run working set
//! - [`build`] - Build step interface
//! - [`scheduler`] - Sequential build execution
//! - [`report`] - Failure reports
//! - [`vcs`] - Version-control interfaces
//! - [`orchestrator`] - One complete run

pub mod build;
pub mod config;
pub mod dependency;
pub mod orchestrator;
pub mod policy;
pub mod recipe;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod state;
pub mod vcs;
pub mod version;
