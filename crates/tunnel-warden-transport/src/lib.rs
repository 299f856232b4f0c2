//! Transport layer for supervisor observers.
//!
//! Provides:
//! - Wire protocol (tagged JSON)
//! - Command dispatch onto a `SupervisorHandle`
//! - WebSocket transport (feature: websocket)

pub mod dispatch;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use dispatch::dispatch;
pub use protocol::{ClientMessage, ServerMessage};
