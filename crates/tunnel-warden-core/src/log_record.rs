//! Tagged output chunks from the supervised process.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::SessionId;

/// Output stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Immutable chunk of process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Session that produced the chunk.
    pub session_id: SessionId,
    pub stream: LogStream,
    /// Chunk text as received (lossy UTF-8).
    pub text: String,
    /// Receive time (Unix epoch milliseconds).
    pub timestamp_ms: i64,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(session_id: SessionId, stream: LogStream, text: impl Into<String>) -> Self {
        Self {
            session_id,
            stream,
            text: text.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Decode a raw chunk.
    #[must_use]
    pub fn from_bytes(session_id: SessionId, stream: LogStream, bytes: &[u8]) -> Self {
        Self::new(session_id, stream, String::from_utf8_lossy(bytes))
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_from_bytes_is_lossy() {
        let id = Uuid::new_v4();
        let record = LogRecord::from_bytes(id, LogStream::Stderr, b"bad \xff byte");
        assert_eq!(record.session_id, id);
        assert_eq!(record.stream, LogStream::Stderr);
        assert!(record.text.starts_with("bad "));
        assert!(record.text.ends_with(" byte"));
        assert!(record.timestamp_ms > 0);
    }

    #[test]
    fn test_stream_serialization() {
        let json = serde_json::to_string(&LogStream::Stdout).unwrap();
        assert_eq!(json, "\"stdout\"");
    }
}
