//! VPN client process lifecycle on the host: spawn, interrupt, kill by name.

use std::{
    path::Path,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::{process::Command, sync::oneshot};
use tunnel_warden_core::{
    ExitInfo, ExitOutcome, LaunchError, OutputStream, ProcessControl, ProcessLauncher,
    SpawnedProcess,
};

/// `taskkill` exit code when no process matched.
#[cfg(windows)]
const TASKKILL_NOT_FOUND: i32 = 128;

/// `pkill` exit code when no process matched.
#[cfg(not(windows))]
const PKILL_NO_MATCH: i32 = 1;

/// Launches the VPN client as a child of this process.
#[derive(Debug, Default, Clone)]
pub struct HostLauncher;

impl HostLauncher {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for HostLauncher {
    async fn launch(&self, program: &Path, config: &Path) -> Result<SpawnedProcess, LaunchError> {
        let mut child = Command::new(program)
            .arg(config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    LaunchError::ExecutableNotFound(program.display().to_string())
                }
                _ => LaunchError::SpawnFailed(e.to_string()),
            })?;

        let pid = child.id();
        let stdout = child.stdout.take().map(|s| Box::new(s) as OutputStream);
        let stderr = child.stderr.take().map(|s| Box::new(s) as OutputStream);

        let alive = Arc::new(AtomicBool::new(true));
        let (exit_tx, exit_rx) = oneshot::channel();

        let watcher_alive = Arc::clone(&alive);
        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::Exited(ExitInfo::from_status(status)),
                Err(e) => ExitOutcome::Fault(e.to_string()),
            };
            watcher_alive.store(false, Ordering::SeqCst);
            tracing::debug!(?pid, ?outcome, "VPN client process ended");
            let _ = exit_tx.send(outcome);
        });

        tracing::info!(
            ?pid,
            program = %program.display(),
            config = %config.display(),
            "Spawned VPN client"
        );

        Ok(SpawnedProcess {
            stdout,
            stderr,
            exit: exit_rx,
            control: Box::new(ChildControl { pid, alive }),
        })
    }

    async fn kill_by_name(&self, name: &str) -> Result<(), LaunchError> {
        #[cfg(windows)]
        let output = Command::new("taskkill")
            .args(["/IM", name, "/F"])
            .output()
            .await?;
        #[cfg(windows)]
        let not_found = TASKKILL_NOT_FOUND;

        #[cfg(not(windows))]
        let output = Command::new("pkill").args(["-x", name]).output().await?;
        #[cfg(not(windows))]
        let not_found = PKILL_NO_MATCH;

        match output.status.code() {
            Some(0) => {
                tracing::info!(name, "Killed stray process");
                Ok(())
            }
            Some(code) if code == not_found => {
                tracing::debug!(name, "No process to kill");
                Ok(())
            }
            _ => Err(LaunchError::KillFailed {
                name: name.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// Control handle for a child spawned by `HostLauncher`.
struct ChildControl {
    pid: Option<u32>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl ProcessControl for ChildControl {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn interrupt(&self) -> std::io::Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if !self.is_alive() {
            return Ok(());
        }

        let status = interrupt_command(pid).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "interrupt of pid {pid} exited with {status}"
            )))
        }
    }
}

/// Polite stop request for `pid`. Never a forced kill.
fn interrupt_command(pid: u32) -> Command {
    // Windows has no SIGINT for non-console children; ask the client to
    // close without /F so it can still tear the tunnel down.
    #[cfg(windows)]
    let command = {
        let mut command = Command::new("taskkill");
        command.args(["/PID", &pid.to_string(), "/T"]);
        command
    };

    #[cfg(not(windows))]
    let command = {
        let mut command = Command::new("kill");
        command.args(["-INT", &pid.to_string()]);
        command
    };

    command
}


#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("client.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_launch_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = script(dir.path(), "echo hello\necho oops >&2\nexit 3\n");

        let mut spawned = HostLauncher::new()
            .launch(Path::new("/bin/sh"), &config)
            .await
            .unwrap();

        let mut out = String::new();
        spawned
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        let mut err = String::new();
        spawned
            .stderr
            .take()
            .unwrap()
            .read_to_string(&mut err)
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), spawned.exit)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out, "hello\n");
        assert_eq!(err, "oops\n");
        assert_eq!(
            outcome,
            ExitOutcome::Exited(ExitInfo {
                code: Some(3),
                signal: None
            })
        );
        assert!(!spawned.control.is_alive());
    }

    #[tokio::test]
    async fn test_interrupt_delivers_sigint() {
        let dir = tempfile::tempdir().unwrap();
        let config = script(
            dir.path(),
            "trap 'exit 7' INT\nwhile true; do sleep 0.1; done\n",
        );

        let spawned = HostLauncher::new()
            .launch(Path::new("/bin/sh"), &config)
            .await
            .unwrap();
        assert!(spawned.control.pid().is_some());
        assert!(spawned.control.is_alive());

        // Give the shell time to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        spawned.control.interrupt().await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), spawned.exit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            ExitOutcome::Exited(ExitInfo {
                code: Some(7),
                signal: None
            })
        );
    }

    #[test]
    fn test_interrupt_sends_sigint_only() {
        let command = interrupt_command(42);
        let args: Vec<_> = command.as_std().get_args().collect();
        assert_eq!(command.as_std().get_program(), "kill");
        assert_eq!(args, ["-INT", "42"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = script(dir.path(), "exit 0\n");

        let result = HostLauncher::new()
            .launch(&dir.path().join("no-such-client"), &config)
            .await;
        assert!(matches!(result, Err(LaunchError::ExecutableNotFound(_))));
    }
}
