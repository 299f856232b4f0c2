//! Core abstractions for supervising an external VPN client process.
//!
//! This crate provides the fundamental building blocks:
//! - `Session` - Connection session state machine
//! - `EventBus` - Broadcast of status and log events, no replay
//! - `LogRecord` - Tagged output chunk from the supervised process
//! - Launcher, DNS and adapter traits used as seams by the supervisor

pub mod event_bus;
pub mod log_record;
pub mod session;
pub mod traits;

pub use event_bus::{BusEvent, EventBus, StatusEvent, StatusLevel};
pub use log_record::{LogRecord, LogStream};
pub use session::{ExitInfo, Session, SessionId, SessionSnapshot, SessionState, TransitionError};
pub use traits::{
    AdapterSource, Ack, DnsSync, ExitOutcome, LaunchError, OutputStream, ProcessControl,
    ProcessLauncher, SpawnedProcess, SyncError, Verdict,
};
