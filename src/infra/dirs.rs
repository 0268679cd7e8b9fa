//! Where repobuild keeps its files when nothing else says so
//!
//! The config directory holds `config.toml`; the state directory holds the
//! run state, the lock, version files, build logs and spooled reports.
//! Each can be redirected with an environment variable:
//! - `REPOBUILD_CONFIG_DIR`
//! - `REPOBUILD_STATE_DIR`

use std::path::{Path, PathBuf};

/// Environment variable names for directory overrides
pub const ENV_CONFIG_DIR: &str = "REPOBUILD_CONFIG_DIR";
pub const ENV_STATE_DIR: &str = "REPOBUILD_STATE_DIR";

const APP_NAME: &str = "repobuild";

/// Config and state locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepobuildDirs {
    config_dir: PathBuf,
    state_dir: PathBuf,
}

impl RepobuildDirs {
    /// Locations from the environment, else the platform defaults
    ///
    /// - config: `$XDG_CONFIG_HOME/repobuild`, `~/Library/Application Support/repobuild`
    /// - state: `$XDG_DATA_HOME/repobuild`, `~/Library/Application Support/repobuild`
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: locate(
                std::env::var_os(ENV_CONFIG_DIR),
                dirs::config_dir(),
                &[".config"],
            ),
            state_dir: locate(
                std::env::var_os(ENV_STATE_DIR),
                dirs::data_dir(),
                &[".local", "share"],
            ),
        }
    }

    /// Fixed locations, for callers that already know them
    #[must_use]
    pub fn at(config_dir: &Path, state_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    /// `config.toml` inside the config directory
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Default for RepobuildDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Override, else platform directory, else `home/<fallback>`, each + app name
fn locate(
    overridden: Option<std::ffi::OsString>,
    platform: Option<PathBuf>,
    fallback: &[&str],
) -> PathBuf {
    if let Some(path) = overridden.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let base = platform.unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        fallback.iter().fold(home, |path, part| path.join(part))
    });
    base.join(APP_NAME)
}
