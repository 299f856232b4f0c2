//! Tunnel supervisor.
//!
//! Provides:
//! - `Supervisor` / `SupervisorHandle` - Single-session actor and its front door
//! - `SupervisorConfig` - Paths, process names and delays
//! - `LogSink` / `spawn_relay` - Process output into the log file and event bus
//! - `list_servers` - Tunnel configuration discovery

pub mod config;
pub mod error;
pub mod log_relay;
pub mod servers;
mod slot;
pub mod supervisor;

pub use config::{CONFIG_EXTENSION, SupervisorConfig};
pub use error::{ProcessFault, StartError, StopError, SupervisorError};
pub use log_relay::{LogSink, spawn_relay};
pub use servers::list_servers;
pub use supervisor::{StatusReport, Supervisor, SupervisorHandle};
