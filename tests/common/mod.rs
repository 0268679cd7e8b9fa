//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Artifact suffix used by the test build command
pub const SUFFIX: &str = ".pkg.tar.zst";

/// Build command producing `<directory>-1.0-1-any.pkg.tar.zst`
pub const TOUCH_BUILD: &str = r#"["sh", "-c", "touch \"$(basename \"$(pwd -P)\")-1.0-1-any.pkg.tar.zst\""]"#;

/// Test repository context
///
/// A package repository, a state directory and a config file pointing at
/// both, all inside one temporary directory.
pub struct TestRepo {
    /// Temporary directory holding everything
    pub dir: TempDir,
}

impl TestRepo {
    /// Create an empty repository layout
    pub fn new() -> Self {
        let repo = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        std::fs::create_dir_all(repo.repo()).expect("Failed to create repository directory");
        std::fs::create_dir_all(repo.state()).expect("Failed to create state directory");
        repo.write_config("");
        repo
    }

    /// Package repository root
    pub fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// State directory
    pub fn state(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    /// Artifact destination
    pub fn destination(&self) -> PathBuf {
        self.dir.path().join("dest")
    }

    /// Config file
    pub fn config(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    /// Write the config file, appending `extra` to the base settings
    pub fn write_config(&self, extra: &str) {
        let content = format!(
            r#"[repository]
path = {repo:?}
destination = {dest:?}

[state]
dir = {state:?}

[build]
command = {TOUCH_BUILD}
artifact_suffixes = [{SUFFIX:?}]

[vcs]
pull = false
push = false
{extra}
"#,
            repo = self.repo().display().to_string(),
            dest = self.destination().display().to_string(),
            state = self.state().display().to_string(),
        );
        std::fs::write(self.config(), content).expect("Failed to write config");
    }

    /// Create a package directory with `recipe` as its recipe.toml
    pub fn add_package(&self, name: &str, recipe: &str) {
        let dir = self.repo().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create package directory");
        std::fs::write(dir.join("recipe.toml"), recipe).expect("Failed to write recipe");
    }

    /// Record upstream versions as the version checker would
    pub fn set_new_versions(&self, versions: &[(&str, &str)]) {
        let map: BTreeMap<&str, &str> = versions.iter().copied().collect();
        let json = serde_json::to_string_pretty(&map).expect("Failed to serialize versions");
        std::fs::write(self.state().join("new_versions.json"), json).expect("Failed to write versions");
    }

    /// Whether `path` (relative to the temp root) exists
    pub fn exists(&self, path: &str) -> bool {
        self.dir.path().join(path).exists()
    }

    /// Read a file relative to the temp root
    pub fn read_file(&self, path: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(path)).expect("Failed to read file")
    }

    /// Initialize git and commit everything
    pub fn git_init(&self) {
        git(&self.repo(), &["init", "-q"]);
        self.commit("initial");
    }

    /// Commit every change in the repository
    pub fn commit(&self, message: &str) {
        git(&self.repo(), &["add", "-A"]);
        git(
            &self.repo(),
            &[
                "-c",
                "user.name=repobuild",
                "-c",
                "user.email=repobuild@example.org",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                message,
            ],
        );
    }

    /// Current head revision
    pub fn head(&self) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.repo())
            .output()
            .expect("Failed to run git rev-parse");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Run the repobuild binary with this repository's config
    pub fn repobuild(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_repobuild"))
            .arg("--config")
            .arg(self.config())
            .args(args)
            .env_remove("RUST_LOG")
            .env_remove("REPOBUILD_CONFIG")
            .output()
            .expect("Failed to execute repobuild")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a git executable is available
pub fn has_git() -> bool {
    which::which("git").is_ok()
}

fn git(cwd: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

/// Stdout of a finished command
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr of a finished command
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
