//! Wire protocol for client-server communication.

use serde::{Deserialize, Serialize};
use tunnel_warden_core::{
    BusEvent, LogStream, SessionId, SessionSnapshot, SessionState, StatusLevel,
};
use tunnel_warden_supervisor::StatusReport;

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// List available tunnel configurations.
    GetServers,
    /// Run the dynamic-DNS update alone.
    SyncDns,
    /// Sync DNS and start the client.
    Connect { config_id: String },
    /// Interrupt the running client.
    Disconnect,
    /// Request a session snapshot.
    Status,
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Configuration identifiers.
    Servers { items: Vec<String> },
    /// Status notice from the supervisor.
    Status {
        level: StatusLevel,
        text: String,
        session_id: Option<SessionId>,
        state: Option<SessionState>,
    },
    /// Chunk of client output.
    Log {
        stream: LogStream,
        text: String,
        session_id: SessionId,
        timestamp_ms: i64,
    },
    /// Reply to [`ClientMessage::Status`].
    Snapshot {
        current: SessionSnapshot,
        last_finished: Option<SessionSnapshot>,
    },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    #[must_use]
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

impl From<BusEvent> for ServerMessage {
    fn from(event: BusEvent) -> Self {
        match event {
            BusEvent::Status(status) => Self::Status {
                level: status.level,
                text: status.text,
                session_id: status.session_id,
                state: status.state,
            },
            BusEvent::Log(record) => Self::Log {
                stream: record.stream,
                text: record.text,
                session_id: record.session_id,
                timestamp_ms: record.timestamp_ms,
            },
        }
    }
}

impl From<StatusReport> for ServerMessage {
    fn from(report: StatusReport) -> Self {
        Self::Snapshot {
            current: report.current,
            last_finished: report.last_finished,
        }
    }
}
