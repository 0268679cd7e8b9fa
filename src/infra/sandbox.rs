//! Build isolation using Docker/Podman containers
//!
//! Wraps a build command so it runs inside a throwaway container with the
//! package directory mounted as its working directory.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::{BindMount, SandboxSettings};
use crate::infra::process;

/// Sandbox-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// Neither runtime is installed
    #[error("Neither Docker nor Podman found in PATH")]
    RuntimeNotFound,
}

/// Container runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker container runtime
    Docker,
    /// Podman container runtime
    Podman,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// First runtime found in PATH, Docker preferred
    pub fn detect() -> Option<Self> {
        [Self::Docker, Self::Podman]
            .into_iter()
            .find(|runtime| which::which(runtime.command()).is_ok())
    }
}

/// Mount point inside the container for the package directory
const WORKDIR: &str = "/build";

/// Container settings for one build
#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime: Vec<String>,
    image: String,
    network_enabled: bool,
}

impl Sandbox {
    /// Sandbox from configuration, using whichever runtime is installed
    pub fn from_settings(settings: &SandboxSettings) -> Result<Self, SandboxError> {
        let runtime = ContainerRuntime::detect().ok_or(SandboxError::RuntimeNotFound)?;
        Ok(Self::with_runtime(runtime, settings))
    }

    /// Sandbox from configuration using `runtime`
    pub fn with_runtime(runtime: ContainerRuntime, settings: &SandboxSettings) -> Self {
        Self {
            runtime: vec![runtime.command().to_string()],
            image: settings.image().to_string(),
            network_enabled: settings.network,
        }
    }

    /// Invoke the runtime as `command` instead of by name
    #[must_use]
    pub fn with_runtime_command(mut self, command: Vec<String>) -> Self {
        self.runtime = command;
        self
    }

    /// Container name for a build of `package` by this process
    ///
    /// Characters a container name cannot hold become `-`.
    pub fn container_name(package: &str) -> String {
        let package: String = package
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!("repobuild-{package}-{}", std::process::id())
    }

    /// Command running `command` in container `name` rooted at `package_dir`
    pub fn wrap(
        &self,
        command: &[String],
        name: &str,
        package_dir: &Path,
        mounts: &[BindMount],
    ) -> Vec<String> {
        let mut args = self.runtime.clone();
        args.extend(["run".to_string(), "--rm".to_string(), format!("--name={name}")]);

        if !self.network_enabled {
            args.push("--network=none".to_string());
        }

        let package_mount = BindMount {
            host: package_dir.to_path_buf(),
            container: PathBuf::from(WORKDIR),
            read_only: false,
        };
        for mount in std::iter::once(&package_mount).chain(mounts) {
            let mut volume = format!(
                "-v={}:{}",
                mount.host.display(),
                mount.container.display()
            );
            if mount.read_only {
                volume.push_str(":ro");
            }
            args.push(volume);
        }

        args.push(format!("-w={WORKDIR}"));
        args.push(self.image.clone());
        args.extend(command.iter().cloned());
        args
    }

    /// Kill container `name`
    ///
    /// The container is not a child of the runtime client, so killing the
    /// client leaves it running.
    pub async fn kill(&self, name: &str, cwd: &Path) {
        let mut command = self.runtime.clone();
        command.extend(["kill".to_string(), name.to_string()]);

        match process::run_captured(&command, cwd).await {
            Ok((status, _)) if status.success() => {
                tracing::debug!(container = name, "killed container");
            }
            Ok((status, output)) => {
                tracing::warn!(container = name, %status, output = output.trim(), "failed to kill container");
            }
            Err(e) => tracing::warn!(container = name, error = %e, "failed to run container kill"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SandboxSettings {
        SandboxSettings {
            enabled: true,
            image: Some("archlinux:base-devel".to_string()),
            network: false,
            bind_mounts: vec![BindMount {
                host: PathBuf::from("/var/cache/pacman"),
                container: PathBuf::from("/var/cache/pacman"),
                read_only: true,
            }],
        }
    }

    #[test]
    fn test_container_runtime_command() {
        assert_eq!(ContainerRuntime::Docker.command(), "docker");
        assert_eq!(ContainerRuntime::Podman.command(), "podman");
    }

    #[test]
    fn test_wrap_mounts_package_and_bind_mounts() {
        let settings = settings();
        let sandbox = Sandbox::with_runtime(ContainerRuntime::Podman, &settings);
        let args = sandbox.wrap(
            &["makepkg".to_string()],
            "repobuild-foo-1",
            Path::new("/srv/pkgs/foo"),
            &settings.bind_mounts,
        );

        assert_eq!(
            args,
            vec![
                "podman",
                "run",
                "--rm",
                "--name=repobuild-foo-1",
                "--network=none",
                "-v=/srv/pkgs/foo:/build",
                "-v=/var/cache/pacman:/var/cache/pacman:ro",
                "-w=/build",
                "archlinux:base-devel",
                "makepkg",
            ]
        );
    }

    #[test]
    fn test_network_enabled_has_no_network_flag() {
        let mut settings = settings();
        settings.network = true;
        let sandbox = Sandbox::with_runtime(ContainerRuntime::Docker, &settings);

        let args = sandbox.wrap(&["true".to_string()], "c", Path::new("/p"), &[]);
        assert!(!args.iter().any(|a| a.starts_with("--network")));
    }

    #[test]
    fn test_container_name_is_per_package_and_process() {
        let name = Sandbox::container_name("foo");
        assert_eq!(name, format!("repobuild-foo-{}", std::process::id()));
        assert!(Sandbox::container_name("gtk+3@git").starts_with("repobuild-gtk-3-git-"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_names_the_container() {
        let dir = tempfile::TempDir::new().unwrap();
        let sandbox = Sandbox::with_runtime(ContainerRuntime::Docker, &settings())
            .with_runtime_command(vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo \"$@\" > killed".to_string(),
                "docker".to_string(),
            ]);

        sandbox.kill("repobuild-foo-7", dir.path()).await;

        let killed = std::fs::read_to_string(dir.path().join("killed")).unwrap();
        assert_eq!(killed.trim(), "kill repobuild-foo-7");
    }
}
