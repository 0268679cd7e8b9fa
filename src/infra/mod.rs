//! Infrastructure layer
//!
//! Handles all I/O operations: filesystem, external processes, git and the
//! run lock. Default implementations of the core collaborator traits live here.

pub mod build_log;
pub mod builder;
pub mod dirs;
pub mod filesystem;
pub mod git;
pub mod lock;
pub mod process;
pub mod report;
pub mod sandbox;
pub mod store;
pub mod versions;
