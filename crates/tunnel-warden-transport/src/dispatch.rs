//! Client command dispatch onto the supervisor.

use tunnel_warden_supervisor::SupervisorHandle;

use crate::protocol::{ClientMessage, ServerMessage};

/// Apply one client command.
///
/// Queries return their reply directly. Commands return nothing on success;
/// their outcome reaches the client through the event bus.
pub async fn dispatch(handle: &SupervisorHandle, msg: ClientMessage) -> Option<ServerMessage> {
    let sent = match msg {
        ClientMessage::Ping => return Some(ServerMessage::Pong),
        ClientMessage::GetServers => {
            return Some(ServerMessage::Servers {
                items: handle.get_servers().await,
            });
        }
        ClientMessage::Status => {
            return Some(match handle.status().await {
                Ok(report) => report.into(),
                Err(e) => ServerMessage::error(e),
            });
        }
        ClientMessage::SyncDns => handle.sync_dns(),
        ClientMessage::Connect { config_id } => {
            tracing::info!(config = %config_id, "Connect requested");
            handle.connect(config_id)
        }
        ClientMessage::Disconnect => {
            tracing::info!("Disconnect requested");
            handle.disconnect()
        }
    };
    sent.err().map(ServerMessage::error)
}

#[cfg(test)]
mod tests {
    use tunnel_warden_core::{BusEvent, SessionState, StatusLevel};
    use tunnel_warden_supervisor::{Supervisor, SupervisorConfig};

    use super::*;

    async fn spawn_supervisor(home: &std::path::Path) -> SupervisorHandle {
        std::fs::create_dir_all(home.join("vpn-configs")).unwrap();
        std::fs::write(home.join("vpn-configs").join("home.ovpn"), "").unwrap();
        Supervisor::new(SupervisorConfig::new(home))
            .spawn()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_queries_reply_directly() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(tmp.path()).await;

        assert_eq!(
            dispatch(&handle, ClientMessage::Ping).await,
            Some(ServerMessage::Pong)
        );
        assert_eq!(
            dispatch(&handle, ClientMessage::GetServers).await,
            Some(ServerMessage::Servers {
                items: vec!["home.ovpn".to_string()]
            })
        );

        let Some(ServerMessage::Snapshot { current, .. }) =
            dispatch(&handle, ClientMessage::Status).await
        else {
            panic!("expected snapshot");
        };
        assert_eq!(current.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_commands_report_through_bus() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(tmp.path()).await;
        let mut events = handle.subscribe();

        assert_eq!(dispatch(&handle, ClientMessage::Disconnect).await, None);

        let BusEvent::Status(status) = events.recv().await.unwrap() else {
            panic!("expected status");
        };
        assert_eq!(status.level, StatusLevel::Warning);
        assert!(status.text.contains("not connected"));
    }

    #[tokio::test]
    async fn test_closed_supervisor_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(tmp.path()).await;
        handle
            .shutdown(std::time::Duration::from_millis(100))
            .await
            .unwrap();
        while handle.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            dispatch(&handle, ClientMessage::Connect {
                config_id: "home.ovpn".to_string()
            })
            .await,
            Some(ServerMessage::Error { .. })
        ));
    }
}
