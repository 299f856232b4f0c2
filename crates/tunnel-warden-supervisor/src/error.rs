//! Supervisor errors.
//!
//! Start and stop failures are reported to observers as status messages
//! rendered from these types; only [`SupervisorError`] reaches callers of
//! the handle.

use thiserror::Error;
use tunnel_warden_core::{LaunchError, SyncError};

/// Why a connect request did not produce a running process.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("VPN is already connected")]
    AlreadyConnected,
    #[error("Tunnel configuration not found: {0}")]
    ConfigNotFound(String),
    #[error("VPN client executable not found: {0}")]
    BinaryNotFound(String),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("VPN client failed to start: {0}")]
    Launch(#[from] LaunchError),
    #[error("Supervisor is shutting down")]
    ShuttingDown,
}

/// Why a disconnect request was not acted on.
#[derive(Debug, Error)]
pub enum StopError {
    #[error("VPN is not connected")]
    NotConnected,
    #[error("Disconnect already in progress")]
    AlreadyStopping,
}

/// Failure reported while a process is being supervised.
#[derive(Debug, Error)]
#[error("VPN process error: {0}")]
pub struct ProcessFault(pub String);

/// Errors returned to handle callers.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Supervisor is not running")]
    Closed,
    #[error("Failed to open VPN log {path}: {source}")]
    LogSink {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
