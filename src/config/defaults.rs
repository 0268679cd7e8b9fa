//! Default configuration values

use std::time::Duration;

/// Revision recorded before any run has completed (git's empty tree object)
///
/// Diffing from it against head reports every package as changed.
pub const EMPTY_TREE_REVISION: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Recipe file looked up in every package directory
pub const RECIPE_FILE: &str = "recipe.toml";

/// Persisted run state file name (inside the state directory)
pub const STATE_FILE: &str = "state.json";

/// Lock file serializing runs (inside the state directory)
pub const LOCK_FILE: &str = "repobuild.lock";

/// Previously recorded versions (inside the state directory)
pub const OLD_VERSIONS_FILE: &str = "old_versions.json";

/// Versions detected by the upstream checker (inside the state directory)
pub const NEW_VERSIONS_FILE: &str = "new_versions.json";

/// Per-package build output directory (inside the state directory)
pub const LOGS_DIR: &str = "logs";

/// Spooled reports (inside the state directory)
pub const REPORTS_DIR: &str = "reports";

/// Append-only build record (inside the state directory)
pub const BUILD_LOG_FILE: &str = "build-log.jsonl";

/// Time limit for a single package build when the recipe sets none
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(60 * 60);

/// Build command used when neither recipe nor config overrides it
pub const DEFAULT_BUILD_COMMAND: &[&str] = &["makepkg", "--syncdeps", "--noconfirm", "--cleanbuild"];

/// File suffixes identifying built artifacts in a package directory
pub const DEFAULT_ARTIFACT_SUFFIXES: &[&str] = &[".pkg.tar.zst", ".pkg.tar.xz", ".pkg.tar.gz"];

/// Default container image for sandboxed builds
pub const DEFAULT_SANDBOX_IMAGE: &str = "archlinux:base-devel";

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
