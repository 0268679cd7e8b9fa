//! Child process execution
//!
//! Runs build commands with their output captured to a log file and a
//! wall-clock limit. On expiry the whole process tree is killed.
//!
//! Children get their own process group, so an interrupt typed at the
//! terminal reaches only repobuild, which lets the current build finish.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use sysinfo::{Pid, ProcessExt, System, SystemExt};
use tokio::process::Command;

/// How a limited process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exited on its own
    Exited(ExitStatus),
    /// Killed after exceeding its time limit
    TimedOut,
}

/// Run `command` in `cwd`, appending its output to `log`
pub async fn run_limited(
    command: &[String],
    cwd: &Path,
    log: &Path,
    limit: Duration,
) -> io::Result<ProcessOutcome> {
    let Some((program, args)) = command.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    };

    let log_file = File::options().create(true).append(true).open(log)?;
    let mut child = command_in(program, args, cwd)
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file))
        .kill_on_drop(true)
        .spawn()?;

    tracing::debug!(program = %program, pid = child.id(), cwd = %cwd.display(), "spawned");

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok(ProcessOutcome::Exited(status?)),
        Err(_) => {
            if let Some(pid) = child.id() {
                kill_descendants(pid);
            }
            if let Err(e) = child.kill().await {
                tracing::warn!(program = %program, error = %e, "failed to kill timed out process");
            }
            Ok(ProcessOutcome::TimedOut)
        }
    }
}

/// Run `command` in `cwd` to completion, returning its combined output
pub async fn run_captured(command: &[String], cwd: &Path) -> io::Result<(ExitStatus, String)> {
    let Some((program, args)) = command.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    };

    let output = command_in(program, args, cwd).output().await?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status, text))
}

fn command_in(program: &str, args: &[String], cwd: &Path) -> Command {
    let mut command = Command::new(program);
    command.args(args).current_dir(cwd).stdin(Stdio::null());
    #[cfg(unix)]
    command.process_group(0);
    command
}

/// Kill every descendant of `root`, deepest first
pub fn kill_descendants(root: u32) {
    let mut system = System::new();
    system.refresh_processes();

    let mut children: BTreeMap<Pid, Vec<Pid>> = BTreeMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut descendants = Vec::new();
    let mut queue = VecDeque::from([Pid::from(root as usize)]);
    while let Some(pid) = queue.pop_front() {
        for child in children.get(&pid).into_iter().flatten() {
            descendants.push(*child);
            queue.push_back(*child);
        }
    }

    for pid in descendants.iter().rev() {
        if let Some(process) = system.process(*pid) {
            tracing::debug!(pid = %pid, name = process.name(), "killing descendant");
            process.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_output_goes_to_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");

        let outcome = run_limited(&sh("echo out; echo err >&2"), dir.path(), &log, Duration::from_secs(10))
            .await
            .unwrap();

        assert!(matches!(outcome, ProcessOutcome::Exited(status) if status.success()));
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("out"));
        assert!(content.contains("err"));
    }

    #[tokio::test]
    async fn test_runs_in_given_directory() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");

        run_limited(&sh("touch marker"), dir.path(), &log, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_time_limit_kills_process_tree() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");

        let started = std::time::Instant::now();
        let outcome = run_limited(
            &sh("sleep 30 & echo $! > child.pid; wait"),
            dir.path(),
            &log,
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        assert_eq!(outcome, ProcessOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let grandchild: usize = std::fs::read_to_string(dir.path().join("child.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut system = System::new();
        system.refresh_processes();
        let alive = system
            .process(Pid::from(grandchild))
            .is_some_and(|p| p.status() != sysinfo::ProcessStatus::Zombie);
        assert!(!alive);
    }

    /// Process group id from the contents of `/proc/<pid>/stat`
    #[cfg(target_os = "linux")]
    fn pgid(stat: &str) -> u32 {
        let (_, fields) = stat.rsplit_once(") ").unwrap();
        fields.split(' ').nth(2).unwrap().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_child_has_its_own_process_group() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");

        run_limited(
            &sh("echo $$ > pid; cat /proc/$$/stat > stat"),
            dir.path(),
            &log,
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        let child_pid: u32 = std::fs::read_to_string(dir.path().join("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let child_pgid = pgid(&std::fs::read_to_string(dir.path().join("stat")).unwrap());
        let own_pgid = pgid(&std::fs::read_to_string("/proc/self/stat").unwrap());

        assert_eq!(child_pgid, child_pid);
        assert_ne!(child_pgid, own_pgid);
    }

    #[tokio::test]
    async fn test_captured_output() {
        let dir = TempDir::new().unwrap();
        let (status, output) = run_captured(&sh("echo hello"), dir.path()).await.unwrap();
        assert!(status.success());
        assert_eq!(output.trim(), "hello");
    }
}
