//! Connection session state machine.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Session identifier.
pub type SessionId = Uuid;

/// Lifecycle state of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection attempt in progress.
    Idle,
    /// Waiting on the dynamic-DNS pre-flight call.
    SyncingDns,
    /// Clearing stray processes and spawning the client.
    Starting,
    /// Client process spawned.
    Running,
    /// Interrupt sent, waiting for the process to exit.
    Stopping,
    /// Process exited on its own terms.
    Terminated,
    /// Process could not be spawned or reported a fault.
    Failed,
}

impl SessionState {
    /// Whether the session has reached an end state.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    /// Whether a process handle is expected to be held in this state.
    #[must_use]
    pub const fn holds_process(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::SyncingDns => "syncing_dns",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Exit code and signal of a finished process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number (Unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Build exit info from a process status.
    #[must_use]
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code: {code}")?,
            None => f.write_str("code: none")?,
        }
        if let Some(signal) = self.signal {
            write!(f, ", signal: {signal}")?;
        }
        Ok(())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid session transition from {from} to {to}")]
    Invalid { from: SessionState, to: SessionState },
    #[error("exit already recorded for session {0}")]
    ExitAlreadyRecorded(SessionId),
}

/// One attempt to run the VPN client end-to-end.
///
/// All mutation goes through the transition methods below so the ordering
/// `SyncingDns -> Starting -> Running -> (Stopping) -> Terminated | Failed`
/// cannot be violated, and `exit_info` is present exactly when the state is
/// `Terminated` or `Failed`.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    config_ref: String,
    state: SessionState,
    exit_info: Option<ExitInfo>,
    created_at: i64,
    updated_at: i64,
}

impl Session {
    /// Create an idle session for the given configuration.
    #[must_use]
    pub fn new(config_ref: impl Into<String>) -> Self {
        let timestamp = now();
        Self {
            id: Uuid::new_v4(),
            config_ref: config_ref.into(),
            state: SessionState::Idle,
            exit_info: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn config_ref(&self) -> &str {
        &self.config_ref
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn exit_info(&self) -> Option<ExitInfo> {
        self.exit_info
    }

    /// `Idle -> SyncingDns`.
    ///
    /// # Errors
    /// Returns error if the session is not idle.
    pub fn begin_dns_sync(&mut self) -> Result<(), TransitionError> {
        self.advance(&[SessionState::Idle], SessionState::SyncingDns)
    }

    /// `SyncingDns -> Starting`, only once the DNS gate acknowledged.
    ///
    /// # Errors
    /// Returns error if the session is not syncing DNS.
    pub fn dns_acknowledged(&mut self) -> Result<(), TransitionError> {
        self.advance(&[SessionState::SyncingDns], SessionState::Starting)
    }

    /// `Starting -> Running`.
    ///
    /// # Errors
    /// Returns error if the session is not starting.
    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        self.advance(&[SessionState::Starting], SessionState::Running)
    }

    /// `Running -> Stopping`.
    ///
    /// # Errors
    /// Returns error if the session is not running.
    pub fn begin_stop(&mut self) -> Result<(), TransitionError> {
        self.advance(&[SessionState::Running], SessionState::Stopping)
    }

    /// Abandon a connect attempt before any process was spawned.
    ///
    /// # Errors
    /// Returns error if a process may already exist.
    pub fn abort(&mut self) -> Result<(), TransitionError> {
        self.advance(
            &[SessionState::SyncingDns, SessionState::Starting],
            SessionState::Idle,
        )
    }

    /// `Running | Stopping -> Terminated`, recording the exit.
    ///
    /// # Errors
    /// Returns error if the exit was already recorded or no process is held.
    pub fn record_exit(&mut self, info: ExitInfo) -> Result<(), TransitionError> {
        if self.exit_info.is_some() {
            return Err(TransitionError::ExitAlreadyRecorded(self.id));
        }
        self.advance(
            &[SessionState::Running, SessionState::Stopping],
            SessionState::Terminated,
        )?;
        self.exit_info = Some(info);
        Ok(())
    }

    /// `Starting | Running | Stopping -> Failed`.
    ///
    /// # Errors
    /// Returns error if the session already finished or never started.
    pub fn fail(&mut self, info: ExitInfo) -> Result<(), TransitionError> {
        if self.exit_info.is_some() {
            return Err(TransitionError::ExitAlreadyRecorded(self.id));
        }
        self.advance(
            &[
                SessionState::Starting,
                SessionState::Running,
                SessionState::Stopping,
            ],
            SessionState::Failed,
        )?;
        self.exit_info = Some(info);
        Ok(())
    }

    /// Serializable view of this session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Some(self.id),
            config_ref: Some(self.config_ref.clone()),
            state: self.state,
            exit_info: self.exit_info,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }

    fn advance(
        &mut self,
        allowed: &[SessionState],
        to: SessionState,
    ) -> Result<(), TransitionError> {
        if !allowed.contains(&self.state) {
            return Err(TransitionError::Invalid {
                from: self.state,
                to,
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.state, %to, "Session transition");
        self.state = to;
        self.updated_at = now();
        Ok(())
    }
}

/// Point-in-time view of the supervisor's session slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub config_ref: Option<String>,
    pub state: SessionState,
    pub exit_info: Option<ExitInfo>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: Option<i64>,
    /// Last transition timestamp.
    pub updated_at: Option<i64>,
}

impl SessionSnapshot {
    /// Snapshot of an empty slot.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            session_id: None,
            config_ref: None,
            state: SessionState::Idle,
            exit_info: None,
            created_at: None,
            updated_at: None,
        }
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_invariant_holds(session: &Session) -> bool {
        session.exit_info().is_some() == session.state().is_finished()
    }

    #[test]
    fn test_happy_path_to_terminated() {
        let mut session = Session::new("home.ovpn");
        assert_eq!(session.state(), SessionState::Idle);

        tokio_test::assert_ok!(session.begin_dns_sync());
        tokio_test::assert_ok!(session.dns_acknowledged());
        tokio_test::assert_ok!(session.mark_running());
        session.begin_stop().unwrap();
        assert!(exit_invariant_holds(&session));

        let info = ExitInfo {
            code: Some(0),
            signal: None,
        };
        session.record_exit(info).unwrap();
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(session.exit_info(), Some(info));
        assert!(exit_invariant_holds(&session));
    }

    #[test]
    fn test_cannot_skip_dns_gate() {
        let mut session = Session::new("home.ovpn");
        session.begin_dns_sync().unwrap();

        let err = session.mark_running().unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                from: SessionState::SyncingDns,
                to: SessionState::Running,
            }
        );
        assert_eq!(session.state(), SessionState::SyncingDns);
    }

    #[test]
    fn test_exit_recorded_once() {
        let mut session = Session::new("home.ovpn");
        session.begin_dns_sync().unwrap();
        session.dns_acknowledged().unwrap();
        session.mark_running().unwrap();
        session.record_exit(ExitInfo::default()).unwrap();

        assert!(matches!(
            session.record_exit(ExitInfo::default()),
            Err(TransitionError::ExitAlreadyRecorded(_))
        ));
        assert!(matches!(
            session.fail(ExitInfo::default()),
            Err(TransitionError::ExitAlreadyRecorded(_))
        ));
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_abort_returns_to_idle_without_exit_info() {
        let mut session = Session::new("home.ovpn");
        session.begin_dns_sync().unwrap();
        session.abort().unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(exit_invariant_holds(&session));
    }

    #[test]
    fn test_spawn_failure_sets_exit_info() {
        let mut session = Session::new("home.ovpn");
        session.begin_dns_sync().unwrap();
        session.dns_acknowledged().unwrap();
        session.fail(ExitInfo::default()).unwrap();

        assert_eq!(session.state(), SessionState::Failed);
        assert!(exit_invariant_holds(&session));
        assert!(session.abort().is_err());
    }

    #[test]
    fn test_stop_requires_running() {
        let mut session = Session::new("home.ovpn");
        assert!(session.begin_stop().is_err());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_exit_info_display() {
        let info = ExitInfo {
            code: None,
            signal: Some(2),
        };
        assert_eq!(info.to_string(), "code: none, signal: 2");
        assert_eq!(
            ExitInfo {
                code: Some(1),
                signal: None
            }
            .to_string(),
            "code: 1"
        );
    }

    #[test]
    fn test_snapshot_serializes_snake_case() {
        let session = Session::new("office.ovpn");
        let json = serde_json::to_string(&session.snapshot()).unwrap();
        assert!(json.contains("\"state\":\"idle\""));
        assert!(json.contains("office.ovpn"));
    }
}
