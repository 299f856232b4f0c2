//! Seams between the supervisor and the host it runs on.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{io::AsyncRead, sync::oneshot};

use crate::ExitInfo;

/// Boxed output stream of a spawned process.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited (normally or by signal).
    Exited(ExitInfo),
    /// Waiting on the process failed.
    Fault(String),
}

/// Control surface of a running process.
///
/// The process itself is owned by a watcher task; this handle only sends
/// requests to it.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Whether the process has not been observed to exit yet.
    fn is_alive(&self) -> bool;

    /// Ask the process to shut down (SIGINT on Unix).
    async fn interrupt(&self) -> std::io::Result<()>;
}

/// Spawned process handle.
pub struct SpawnedProcess {
    /// Captured standard output.
    pub stdout: Option<OutputStream>,
    /// Captured standard error.
    pub stderr: Option<OutputStream>,
    /// Resolves once when the process ends.
    pub exit: oneshot::Receiver<ExitOutcome>,
    pub control: Box<dyn ProcessControl>,
}

/// Launcher error.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Failed to kill {name}: {detail}")]
    KillFailed { name: String, detail: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for starting the VPN client and clearing stray instances.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `program` with `config` as its only argument, stdio piped.
    async fn launch(&self, program: &Path, config: &Path) -> Result<SpawnedProcess, LaunchError>;

    /// Terminate every process with the given image name.
    ///
    /// Finding no matching process is success.
    async fn kill_by_name(&self, name: &str) -> Result<(), LaunchError>;
}

/// Successful dynamic-DNS update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Dynamic-DNS update failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Dynamic DNS is not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("Dynamic DNS update failed: {0}")]
    Rejected(String),
    #[error("Dynamic DNS update failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Dynamic DNS update error: {0}")]
    Transport(String),
}

/// Trait for the pre-flight dynamic-DNS update.
#[async_trait]
pub trait DnsSync: Send + Sync {
    /// Push the caller's address to the provider and check the reply.
    async fn sync_and_check(&self) -> Result<Ack, SyncError>;
}

/// Host adapter state after a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// At most one tunnel adapter present.
    Nominal,
    /// More than one tunnel adapter present.
    MultipleActive { count: usize, adapters: Vec<String> },
}

/// Trait for enumerating host network interface names.
pub trait AdapterSource: Send + Sync {
    /// Names of all interfaces, one entry per interface.
    ///
    /// # Errors
    /// Returns error if the host cannot be queried.
    fn interface_names(&self) -> std::io::Result<Vec<String>>;
}
