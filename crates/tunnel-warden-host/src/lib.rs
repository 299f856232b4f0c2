//! Host integration for the tunnel supervisor.
//!
//! Provides:
//! - `HostLauncher` - Spawn the VPN client and kill stray instances by name
//! - `AdapterInspector` - Count virtual tunnel adapters after a session
//! - Executable lookup for bare names and explicit paths

pub mod adapters;
pub mod executable;
pub mod process;

pub use adapters::{AdapterInspector, HostAdapters};
pub use executable::resolve_executable_path;
pub use process::HostLauncher;
