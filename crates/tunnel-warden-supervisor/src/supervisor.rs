//! Supervisor actor and its handle.
//!
//! One task owns the session slot and processes commands and internal
//! events in arrival order. Slow work (the DNS call, clearing stray
//! processes, spawning, interrupting) runs in spawned tasks that post their
//! results back to the queue, so a connect or disconnect never blocks the
//! loop. Results are tagged with the session id they were started for and
//! are dropped when that session is no longer in the slot.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tunnel_warden_core::{
    Ack, BusEvent, DnsSync, EventBus, ExitInfo, ExitOutcome, LogStream, ProcessControl,
    ProcessLauncher, Session, SessionId, SessionSnapshot, SessionState, SpawnedProcess,
    StatusEvent, SyncError, Verdict,
};
use tunnel_warden_dns::DnsSyncGate;
use tunnel_warden_host::{AdapterInspector, HostLauncher, resolve_executable_path};

use crate::{
    config::SupervisorConfig,
    error::{ProcessFault, StartError, StopError, SupervisorError},
    log_relay::{LogSink, spawn_relay},
    servers::list_servers,
    slot::SessionSlot,
};

/// Current and most recently finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Session in the slot, or an idle snapshot.
    pub current: SessionSnapshot,
    /// Last session that reached `Terminated` or `Failed`.
    pub last_finished: Option<SessionSnapshot>,
}

enum SupervisorMsg {
    Connect {
        config_id: String,
    },
    Disconnect,
    SyncDns,
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
    Shutdown {
        grace: Duration,
        reply: oneshot::Sender<()>,
    },
    DnsChecked {
        session_id: SessionId,
        config_path: PathBuf,
        result: Result<Ack, SyncError>,
    },
    Launched {
        session_id: SessionId,
        result: Result<SpawnedProcess, StartError>,
    },
    Exited {
        session_id: SessionId,
        outcome: ExitOutcome,
    },
    ShutdownDeadline,
}

type WeakSender = mpsc::WeakUnboundedSender<SupervisorMsg>;

/// Send to the actor if it is still running; hands the message back if not.
fn post(weak: &WeakSender, msg: SupervisorMsg) -> Result<(), SupervisorMsg> {
    match weak.upgrade() {
        Some(tx) => tx.send(msg).map_err(|e| e.0),
        None => Err(msg),
    }
}

/// Builder for the supervisor task.
pub struct Supervisor {
    config: SupervisorConfig,
    bus: EventBus,
    launcher: Arc<dyn ProcessLauncher>,
    dns: Arc<dyn DnsSync>,
    inspector: AdapterInspector,
}

impl Supervisor {
    /// Supervisor backed by the host process table, network interfaces and
    /// the configured DNS provider.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            bus: EventBus::new(),
            launcher: Arc::new(HostLauncher::new()),
            dns: Arc::new(DnsSyncGate::new(config.dns.clone())),
            inspector: AdapterInspector::host(config.adapter_prefix.clone()),
            config,
        }
    }

    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn with_dns(mut self, dns: Arc<dyn DnsSync>) -> Self {
        self.dns = dns;
        self
    }

    #[must_use]
    pub fn with_inspector(mut self, inspector: AdapterInspector) -> Self {
        self.inspector = inspector;
        self
    }

    /// Open the log sink and start the actor.
    ///
    /// # Errors
    /// Returns error if the log file cannot be opened.
    pub async fn spawn(self) -> Result<SupervisorHandle, SupervisorError> {
        let sink = LogSink::open(&self.config.log_file)
            .await
            .map_err(|source| SupervisorError::LogSink {
                path: self.config.log_file.display().to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SupervisorHandle {
            tx: tx.clone(),
            bus: self.bus.clone(),
            config_dir: self.config.config_dir.clone(),
        };

        let actor = Actor {
            config: Arc::new(self.config),
            bus: self.bus,
            sink,
            launcher: self.launcher,
            dns: self.dns,
            inspector: self.inspector,
            weak_tx: tx.downgrade(),
            slot: SessionSlot::default(),
            last_finished: None,
            shutdown_waiters: Vec::new(),
        };
        drop(tx);
        tracing::info!(adapter_prefix = actor.inspector.prefix(), "Supervisor started");
        tokio::spawn(actor.run(rx));
        Ok(handle)
    }
}

/// Cloneable front door to the supervisor.
///
/// Connect, disconnect and DNS sync are fire-and-forget; their outcome is
/// published on the event bus.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<SupervisorMsg>,
    bus: EventBus,
    config_dir: PathBuf,
}

impl SupervisorHandle {
    fn send(&self, msg: SupervisorMsg) -> Result<(), SupervisorError> {
        self.tx.send(msg).map_err(|_| SupervisorError::Closed)
    }

    /// Sync DNS, then start the client with `config_id`.
    ///
    /// # Errors
    /// Returns error if the supervisor has stopped.
    pub fn connect(&self, config_id: impl Into<String>) -> Result<(), SupervisorError> {
        self.send(SupervisorMsg::Connect {
            config_id: config_id.into(),
        })
    }

    /// Interrupt the running client.
    ///
    /// # Errors
    /// Returns error if the supervisor has stopped.
    pub fn disconnect(&self) -> Result<(), SupervisorError> {
        self.send(SupervisorMsg::Disconnect)
    }

    /// Run the dynamic-DNS update alone and publish the verdict.
    ///
    /// # Errors
    /// Returns error if the supervisor has stopped.
    pub fn sync_dns(&self) -> Result<(), SupervisorError> {
        self.send(SupervisorMsg::SyncDns)
    }

    /// Configuration identifiers available to [`connect`](Self::connect).
    pub async fn get_servers(&self) -> Vec<String> {
        list_servers(&self.config_dir).await
    }

    /// Snapshot of the slot and the last finished session.
    ///
    /// # Errors
    /// Returns error if the supervisor has stopped.
    pub async fn status(&self) -> Result<StatusReport, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorMsg::Status { reply })?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Interrupt any running client and stop the supervisor.
    ///
    /// Resolves once the process has exited or `grace` has elapsed.
    ///
    /// # Errors
    /// Returns error if the supervisor had already stopped.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorMsg::Shutdown { grace, reply })?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe()
    }

    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether the actor is still accepting commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

enum Flow {
    Continue,
    Stop,
}

struct Actor {
    config: Arc<SupervisorConfig>,
    bus: EventBus,
    sink: LogSink,
    launcher: Arc<dyn ProcessLauncher>,
    dns: Arc<dyn DnsSync>,
    inspector: AdapterInspector,
    weak_tx: WeakSender,
    slot: SessionSlot,
    last_finished: Option<SessionSnapshot>,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SupervisorMsg>) {
        while let Some(msg) = rx.recv().await {
            if matches!(self.handle(msg).await, Flow::Stop) {
                break;
            }
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::info!("Supervisor stopped");
    }

    async fn handle(&mut self, msg: SupervisorMsg) -> Flow {
        match msg {
            SupervisorMsg::Connect { config_id } => self.on_connect(config_id).await,
            SupervisorMsg::Disconnect => self.on_disconnect(),
            SupervisorMsg::SyncDns => self.on_sync_dns(),
            SupervisorMsg::Status { reply } => {
                let _ = reply.send(self.report());
            }
            SupervisorMsg::Shutdown { grace, reply } => return self.on_shutdown(grace, reply),
            SupervisorMsg::DnsChecked {
                session_id,
                config_path,
                result,
            } => self.on_dns_checked(session_id, config_path, result),
            SupervisorMsg::Launched { session_id, result } => {
                self.on_launched(session_id, result).await;
            }
            SupervisorMsg::Exited {
                session_id,
                outcome,
            } => {
                self.on_exited(session_id, outcome).await;
                if !self.shutdown_waiters.is_empty() && self.slot.current().is_none() {
                    return Flow::Stop;
                }
            }
            SupervisorMsg::ShutdownDeadline => {
                if let Some(active) = self.slot.current() {
                    tracing::warn!(
                        session_id = %active.session.id(),
                        "VPN process still running at shutdown"
                    );
                }
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            current: self
                .slot
                .current()
                .map_or_else(SessionSnapshot::idle, |a| a.session.snapshot()),
            last_finished: self.last_finished.clone(),
        }
    }

    fn schedule(&self, delay: Duration, msg: SupervisorMsg) {
        let weak = self.weak_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = post(&weak, msg);
        });
    }

    async fn log_lifecycle(&self, line: &str) {
        if let Err(e) = self.sink.append_line(line).await {
            tracing::error!("Failed to write VPN log: {e}");
        }
    }

    async fn on_connect(&mut self, config_id: String) {
        if !self.shutdown_waiters.is_empty() {
            self.bus.publish_status(StatusEvent::warning(
                StartError::ShuttingDown.to_string(),
            ));
            return;
        }
        if let Some(active) = self.slot.current() {
            self.bus.publish_status(
                StatusEvent::warning(StartError::AlreadyConnected.to_string())
                    .for_session(active.session.id(), active.session.state()),
            );
            return;
        }

        let candidate = self.config.config_path(&config_id);
        let exists = match &candidate {
            Some(path) => tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()),
            None => false,
        };
        let Some(config_path) = candidate.filter(|_| exists) else {
            self.bus.publish_status(
                StatusEvent::error(StartError::ConfigNotFound(config_id).to_string())
                    .with_state(SessionState::Idle),
            );
            return;
        };

        let mut session = Session::new(config_id);
        if let Err(e) = session.begin_dns_sync() {
            tracing::error!("Failed to start session: {e}");
            return;
        }
        let session_id = session.id();
        tracing::info!(%session_id, config = session.config_ref(), "Connecting");
        if let Err(session) = self.slot.try_acquire(session) {
            tracing::warn!(session_id = %session.id(), "Slot taken before acquisition");
            return;
        }

        self.bus.publish_status(
            StatusEvent::info("Updating dynamic DNS")
                .for_session(session_id, SessionState::SyncingDns),
        );

        let dns = Arc::clone(&self.dns);
        let weak = self.weak_tx.clone();
        tokio::spawn(async move {
            let result = dns.sync_and_check().await;
            let _ = post(
                &weak,
                SupervisorMsg::DnsChecked {
                    session_id,
                    config_path,
                    result,
                },
            );
        });
    }

    fn on_dns_checked(
        &mut self,
        session_id: SessionId,
        config_path: PathBuf,
        result: Result<Ack, SyncError>,
    ) {
        let Some(active) = self
            .slot
            .get_mut(session_id)
            .filter(|a| a.session.state() == SessionState::SyncingDns)
        else {
            tracing::debug!(%session_id, "Ignoring DNS result for inactive session");
            return;
        };

        if let Err(e) = result {
            self.abort_start(session_id, StartError::Sync(e));
            return;
        }

        if let Err(e) = active.session.dns_acknowledged() {
            tracing::error!(%session_id, "{e}");
            return;
        }
        self.bus.publish_status(
            StatusEvent::info("Dynamic DNS updated; starting VPN client")
                .for_session(session_id, SessionState::Starting),
        );
        self.spawn_launch(session_id, config_path);
    }

    fn spawn_launch(&self, session_id: SessionId, config_path: PathBuf) {
        let launcher = Arc::clone(&self.launcher);
        let binary = self.config.binary.clone();
        let strays: Vec<String> = self
            .config
            .binary_process_name()
            .into_iter()
            .chain(std::iter::once(self.config.helper_process.clone()))
            .collect();
        let weak = self.weak_tx.clone();

        tokio::spawn(async move {
            let result = launch_client(launcher.as_ref(), &binary, &config_path, &strays).await;
            let msg = SupervisorMsg::Launched { session_id, result };
            if let Err(SupervisorMsg::Launched {
                result: Ok(process),
                ..
            }) = post(&weak, msg)
            {
                tracing::warn!(%session_id, "Supervisor gone; interrupting orphaned VPN process");
                if let Err(e) = process.control.interrupt().await {
                    tracing::error!(%session_id, "Failed to interrupt orphaned VPN process: {e}");
                }
            }
        });
    }

    async fn on_launched(
        &mut self,
        session_id: SessionId,
        result: Result<SpawnedProcess, StartError>,
    ) {
        let starting = self
            .slot
            .get(session_id)
            .is_some_and(|a| a.session.state() == SessionState::Starting);

        let process = match result {
            Ok(process) if starting => process,
            Ok(process) => {
                tracing::warn!(%session_id, "Launch finished for inactive session; interrupting");
                tokio::spawn(async move {
                    let _ = process.control.interrupt().await;
                });
                return;
            }
            Err(e) if !starting => {
                tracing::debug!(%session_id, "Ignoring launch failure for inactive session: {e}");
                return;
            }
            Err(e @ StartError::BinaryNotFound(_)) => {
                self.abort_start(session_id, e);
                return;
            }
            Err(e) => {
                self.fail_start(session_id, e).await;
                return;
            }
        };

        let SpawnedProcess {
            stdout,
            stderr,
            exit,
            control,
        } = process;
        let control: Arc<dyn ProcessControl> = Arc::from(control);
        let pid = control.pid();

        let Some(active) = self.slot.get_mut(session_id) else {
            return;
        };
        if let Err(e) = active.session.mark_running() {
            tracing::error!(%session_id, "{e}");
        }
        active.control = Some(control);

        let relays: Vec<JoinHandle<()>> = [(LogStream::Stdout, stdout), (LogStream::Stderr, stderr)]
            .into_iter()
            .filter_map(|(stream, reader)| {
                reader.map(|reader| {
                    spawn_relay(session_id, stream, reader, self.sink.clone(), self.bus.clone())
                })
            })
            .collect();
        self.spawn_exit_watcher(session_id, exit, relays);

        let text = pid.map_or_else(
            || "VPN client started".to_string(),
            |pid| format!("VPN client started (pid {pid})"),
        );
        tracing::info!(%session_id, ?pid, "VPN client running");
        self.bus
            .publish_status(StatusEvent::info(text).for_session(session_id, SessionState::Running));
    }

    /// Report the exit only after both relays have drained, bounded by the
    /// drain timeout.
    fn spawn_exit_watcher(
        &self,
        session_id: SessionId,
        exit: oneshot::Receiver<ExitOutcome>,
        relays: Vec<JoinHandle<()>>,
    ) {
        let weak = self.weak_tx.clone();
        let drain_timeout = self.config.relay_drain_timeout;
        tokio::spawn(async move {
            let outcome = exit.await.unwrap_or_else(|_| {
                ExitOutcome::Fault("process watcher ended without reporting".to_string())
            });
            let drain = async {
                for relay in relays {
                    let _ = relay.await;
                }
            };
            if tokio::time::timeout(drain_timeout, drain).await.is_err() {
                tracing::warn!(%session_id, "Output relays still open after exit");
            }
            let _ = post(
                &weak,
                SupervisorMsg::Exited {
                    session_id,
                    outcome,
                },
            );
        });
    }

    /// Abandon a start before any process exists; the slot returns to idle.
    fn abort_start(&mut self, session_id: SessionId, error: StartError) {
        if let Some(mut active) = self.slot.release(session_id) {
            if let Err(e) = active.session.abort() {
                tracing::error!(%session_id, "{e}");
            }
        }
        self.bus.publish_status(
            StatusEvent::error(error.to_string()).for_session(session_id, SessionState::Idle),
        );
    }

    async fn fail_start(&mut self, session_id: SessionId, error: StartError) {
        if let Some(mut active) = self.slot.release(session_id) {
            if let Err(e) = active.session.fail(ExitInfo::default()) {
                tracing::error!(%session_id, "{e}");
            }
            self.last_finished = Some(active.session.snapshot());
        }
        let text = error.to_string();
        self.log_lifecycle(&text).await;
        self.bus
            .publish_status(StatusEvent::error(text).for_session(session_id, SessionState::Failed));
    }

    async fn on_exited(&mut self, session_id: SessionId, outcome: ExitOutcome) {
        let Some(mut active) = self.slot.release(session_id) else {
            tracing::debug!(%session_id, "Ignoring exit of inactive session");
            return;
        };

        let (status, failed) = match outcome {
            ExitOutcome::Exited(info) => {
                if let Err(e) = active.session.record_exit(info) {
                    tracing::error!(%session_id, "{e}");
                }
                (
                    StatusEvent::info(format!("VPN connection closed ({info})"))
                        .for_session(session_id, SessionState::Terminated),
                    false,
                )
            }
            ExitOutcome::Fault(detail) => {
                if let Err(e) = active.session.fail(ExitInfo::default()) {
                    tracing::error!(%session_id, "{e}");
                }
                (
                    StatusEvent::error(ProcessFault(detail).to_string())
                        .for_session(session_id, SessionState::Failed),
                    true,
                )
            }
        };

        self.log_lifecycle(&status.text).await;
        if let Err(e) = self.sink.flush().await {
            tracing::error!(%session_id, "Failed to flush VPN log: {e}");
        }
        self.last_finished = Some(active.session.snapshot());
        self.bus.publish_status(status);

        if !failed {
            self.spawn_adapter_check(session_id);
        }
    }

    /// Inspect tunnel adapters once the host has had time to settle.
    fn spawn_adapter_check(&self, session_id: SessionId) {
        let inspector = self.inspector.clone();
        let bus = self.bus.clone();
        let settle = self.config.adapter_settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let verdict = match tokio::task::spawn_blocking(move || inspector.inspect()).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    tracing::error!(%session_id, "Adapter inspection failed: {e}");
                    return;
                }
            };
            let status = match &verdict {
                Verdict::Nominal => StatusEvent::info("Tunnel adapter state nominal"),
                Verdict::MultipleActive { count, adapters } => StatusEvent::warning(format!(
                    "Multiple tunnel adapters are active ({count}): {}",
                    adapters.join(", ")
                )),
            };
            bus.publish_status(StatusEvent {
                session_id: Some(session_id),
                ..status
            });
        });
    }

    fn on_disconnect(&mut self) {
        let Some(active) = self.slot.current_mut() else {
            self.bus.publish_status(
                StatusEvent::warning(StopError::NotConnected.to_string())
                    .with_state(SessionState::Idle),
            );
            return;
        };
        let session_id = active.session.id();
        let state = active.session.state();

        let control = match active.control.clone().filter(|_| state.holds_process()) {
            Some(_) if state == SessionState::Stopping => {
                self.bus.publish_status(
                    StatusEvent::info(StopError::AlreadyStopping.to_string())
                        .for_session(session_id, state),
                );
                return;
            }
            Some(control) => control,
            None => {
                self.bus.publish_status(
                    StatusEvent::warning(StopError::NotConnected.to_string())
                        .for_session(session_id, state),
                );
                return;
            }
        };

        if let Err(e) = active.session.begin_stop() {
            tracing::error!(%session_id, "{e}");
            return;
        }
        self.bus.publish_status(
            StatusEvent::info("Disconnecting VPN").for_session(session_id, SessionState::Stopping),
        );
        self.spawn_interrupt(session_id, control);
    }

    /// Interrupt the client, kill the helper, then warn if the client is
    /// still alive after the liveness delay. Never force-kills the client.
    fn spawn_interrupt(&self, session_id: SessionId, control: Arc<dyn ProcessControl>) {
        let launcher = Arc::clone(&self.launcher);
        let helper = self.config.helper_process.clone();
        let bus = self.bus.clone();
        let deadline = tokio::time::Instant::now() + self.config.liveness_delay;

        tokio::spawn(async move {
            if let Err(e) = control.interrupt().await {
                bus.publish_status(
                    StatusEvent::warning(format!("Failed to interrupt VPN process: {e}"))
                        .for_session(session_id, SessionState::Stopping),
                );
            }
            if let Err(e) = launcher.kill_by_name(&helper).await {
                tracing::warn!(%session_id, "Failed to stop {helper}: {e}");
            }

            tokio::time::sleep_until(deadline).await;
            if control.is_alive() {
                bus.publish_status(
                    StatusEvent::warning("VPN process is still running")
                        .for_session(session_id, SessionState::Stopping),
                );
            } else {
                tracing::debug!(%session_id, "VPN process stopped before liveness check");
            }
        });
    }

    fn on_sync_dns(&self) {
        let dns = Arc::clone(&self.dns);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let status = match dns.sync_and_check().await {
                Ok(_) => StatusEvent::info("Dynamic DNS updated"),
                Err(e) => StatusEvent::error(e.to_string()),
            };
            bus.publish_status(status);
        });
    }

    fn on_shutdown(&mut self, grace: Duration, reply: oneshot::Sender<()>) -> Flow {
        self.shutdown_waiters.push(reply);
        if self.shutdown_waiters.len() > 1 {
            return Flow::Continue;
        }

        let Some(active) = self.slot.current_mut() else {
            return Flow::Stop;
        };
        let session_id = active.session.id();
        let state = active.session.state();

        if !state.holds_process() {
            self.abort_start(session_id, StartError::ShuttingDown);
            return Flow::Stop;
        }
        if let (SessionState::Running, Some(control)) = (state, active.control.clone()) {
            if let Err(e) = active.session.begin_stop() {
                tracing::error!(%session_id, "{e}");
            }
            self.bus.publish_status(
                StatusEvent::info("Disconnecting VPN for shutdown")
                    .for_session(session_id, SessionState::Stopping),
            );
            self.spawn_interrupt(session_id, control);
        }

        self.schedule(grace, SupervisorMsg::ShutdownDeadline);
        Flow::Continue
    }
}

async fn launch_client(
    launcher: &dyn ProcessLauncher,
    binary: &Path,
    config: &Path,
    strays: &[String],
) -> Result<SpawnedProcess, StartError> {
    let program = resolve_executable_path(binary)
        .await
        .ok_or_else(|| StartError::BinaryNotFound(binary.display().to_string()))?;

    for name in strays {
        if let Err(e) = launcher.kill_by_name(name).await {
            tracing::warn!("Failed to clear stray {name}: {e}");
        }
    }

    Ok(launcher.launch(&program, config).await?)
}
