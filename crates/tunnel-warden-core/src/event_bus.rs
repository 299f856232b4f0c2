//! Broadcast bus for status and log events.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{LogRecord, SessionId, SessionState};

/// Default channel capacity before slow receivers start lagging.
const BUS_CAPACITY: usize = 10_000;

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Human-readable status notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub text: String,
    /// Session the notice is about, if any.
    pub session_id: Option<SessionId>,
    /// Session state after the change that produced this notice.
    pub state: Option<SessionState>,
}

impl StatusEvent {
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::with_level(StatusLevel::Info, text)
    }

    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::with_level(StatusLevel::Warning, text)
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::with_level(StatusLevel::Error, text)
    }

    /// Attach the session this notice is about.
    #[must_use]
    pub fn for_session(mut self, session_id: SessionId, state: SessionState) -> Self {
        self.session_id = Some(session_id);
        self.state = Some(state);
        self
    }

    /// Attach a state without a session (slot went back to idle).
    #[must_use]
    pub fn with_state(mut self, state: SessionState) -> Self {
        self.state = Some(state);
        self
    }

    fn with_level(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            session_id: None,
            state: None,
        }
    }
}

/// Event carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusEvent {
    Status(StatusEvent),
    Log(LogRecord),
}

impl BusEvent {
    /// Status payload, if this is a status event.
    #[must_use]
    pub const fn as_status(&self) -> Option<&StatusEvent> {
        match self {
            Self::Status(status) => Some(status),
            Self::Log(_) => None,
        }
    }

    /// Log payload, if this is a log event.
    #[must_use]
    pub const fn as_log(&self) -> Option<&LogRecord> {
        match self {
            Self::Log(record) => Some(record),
            Self::Status(_) => None,
        }
    }
}

/// Fire-and-forget broadcast of supervisor events.
///
/// There is no history: a receiver only sees events published after it
/// subscribed. Publishing never waits on receivers; a receiver that falls
/// more than the channel capacity behind loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    /// Create a bus with a custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to current subscribers.
    pub fn publish(&self, event: BusEvent) {
        // No receivers is fine: nobody is watching right now.
        let _ = self.sender.send(event);
    }

    /// Publish a status notice, mirroring it to tracing.
    pub fn publish_status(&self, status: StatusEvent) {
        match status.level {
            StatusLevel::Info => {
                tracing::info!(session_id = ?status.session_id, "{}", status.text);
            }
            StatusLevel::Warning => {
                tracing::warn!(session_id = ?status.session_id, "{}", status.text);
            }
            StatusLevel::Error => {
                tracing::error!(session_id = ?status.session_id, "{}", status.text);
            }
        }
        self.publish(BusEvent::Status(status));
    }

    /// Publish a log record.
    pub fn publish_log(&self, record: LogRecord) {
        self.publish(BusEvent::Log(record));
    }

    /// Get a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Live event stream, skipping over lag gaps.
    #[must_use]
    pub fn subscribe_stream(&self) -> futures::stream::BoxStream<'static, BusEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::debug!("Bus subscriber lagged: {e}");
                        None
                    }
                }
            })
            .boxed()
    }

    /// Number of currently subscribed receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::LogStream;

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish_status(StatusEvent::info("before"));

        let mut rx = bus.subscribe();
        bus.publish_status(StatusEvent::info("after"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.as_status().unwrap().text, "after");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_all_subscribers_see_the_same_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish_status(StatusEvent::warning("adapter check"));

        assert_eq!(first.recv().await.unwrap(), second.recv().await.unwrap());
    }

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        let bus = EventBus::new();
        bus.publish_log(LogRecord::new(Uuid::new_v4(), LogStream::Stdout, "line"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_skips_lagged_gap() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe_stream();

        for i in 0..5 {
            bus.publish_status(StatusEvent::info(format!("event {i}")));
        }

        let first = stream.next().await.unwrap();
        assert_eq!(first.as_status().unwrap().text, "event 3");
        let second = stream.next().await.unwrap();
        assert_eq!(second.as_status().unwrap().text, "event 4");
    }

    #[test]
    fn test_bus_event_serialization() {
        let event = BusEvent::Status(StatusEvent::error("boom"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"status\""));
        assert!(json.contains("\"level\":\"error\""));
    }
}
