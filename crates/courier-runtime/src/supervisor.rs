//! Connection Supervisor
//!
//! Single owner of the chat session. Runs as one actor task that reacts to:
//! - caller commands (start, restart, force reset, shutdown)
//! - lifecycle notifications pushed by the session client
//! - its own internal events (session construction results, retry timers)
//!
//! Every connect attempt bumps a generation counter. Lifecycle notifications,
//! construction results and retry timers carry the generation they belong to
//! and are dropped when it no longer matches, so a session that was torn down
//! can never drive the state machine again.
//!
//! The current state is published on a `watch` channel. The dispatcher reads
//! it before every send and races every suspension point against it, which
//! is how "no send after leaving Online" is enforced without locks.

use crate::backoff::ReconnectContext;
use crate::events::EventBus;
use courier_core::{
    create_command_channel, create_lifecycle_channel, AppEvent, ChannelConfig, Command,
    CommandReceiver, CommandSender, CourierError, CourierResult, DisconnectReason,
    LifecycleEvent, LifecycleNotice, LifecycleReceiver, LifecycleSender, LifecycleSink,
    PairingRenderer, ReconnectConfig, Session, SessionConnector, SessionState,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Supervisor Snapshot
// ----------------------------------------------------------------------------

/// Point-in-time view of the supervisor, shared through a watch channel
#[derive(Clone)]
pub struct SupervisorSnapshot {
    pub state: SessionState,
    pub generation: u64,
    session: Option<Arc<dyn Session>>,
}

impl SupervisorSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            session: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    /// The send-capable handle; only present while Online
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        if self.state.is_online() {
            self.session.clone()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for SupervisorSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorSnapshot")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Internal Events
// ----------------------------------------------------------------------------

enum Internal {
    Constructed {
        generation: u64,
        result: CourierResult<Arc<dyn Session>>,
    },
    RetryDue {
        generation: u64,
    },
}

// ----------------------------------------------------------------------------
// Connection Supervisor
// ----------------------------------------------------------------------------

/// Actor that owns the session and its state machine
pub struct ConnectionSupervisor {
    connector: Arc<dyn SessionConnector>,
    renderer: Arc<dyn PairingRenderer>,
    events: EventBus,
    init_retry_delay: Duration,

    command_receiver: CommandReceiver,
    lifecycle_sender: LifecycleSender,
    lifecycle_receiver: LifecycleReceiver,
    internal_sender: mpsc::UnboundedSender<Internal>,
    internal_receiver: mpsc::UnboundedReceiver<Internal>,
    snapshot: watch::Sender<SupervisorSnapshot>,
    pairing_artifact: Arc<RwLock<Option<String>>>,
    shutdown: CancellationToken,

    state: SessionState,
    generation: u64,
    session: Option<Arc<dyn Session>>,
    open_signalled: bool,
    reconnect: ReconnectContext,
    pending_retry: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Create the supervisor actor and the handle used to drive it
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        renderer: Arc<dyn PairingRenderer>,
        reconnect: &ReconnectConfig,
        channels: &ChannelConfig,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> (Self, SupervisorHandle) {
        let (command_sender, command_receiver) = create_command_channel(channels);
        let (lifecycle_sender, lifecycle_receiver) = create_lifecycle_channel(channels);
        let (internal_sender, internal_receiver) = mpsc::unbounded_channel();
        let (snapshot, snapshot_receiver) = watch::channel(SupervisorSnapshot::initial());
        let pairing_artifact = Arc::new(RwLock::new(None));

        let handle = SupervisorHandle {
            command_sender,
            snapshot: snapshot_receiver,
            pairing_artifact: pairing_artifact.clone(),
        };

        let supervisor = Self {
            connector,
            renderer,
            events,
            init_retry_delay: Duration::from_millis(reconnect.init_retry_delay_ms),
            command_receiver,
            lifecycle_sender,
            lifecycle_receiver,
            internal_sender,
            internal_receiver,
            snapshot,
            pairing_artifact,
            shutdown,
            state: SessionState::Idle,
            generation: 0,
            session: None,
            open_signalled: false,
            reconnect: ReconnectContext::new(reconnect),
            pending_retry: None,
        };

        (supervisor, handle)
    }

    /// Run the supervisor main loop until shutdown
    pub async fn run(mut self) {
        info!("Connection supervisor started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.stop().await;
                    break;
                }

                command = self.command_receiver.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => {
                            self.stop().await;
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }

                Some(notice) = self.lifecycle_receiver.recv() => {
                    self.handle_lifecycle(notice).await;
                }

                Some(internal) = self.internal_receiver.recv() => {
                    self.handle_internal(internal).await;
                }
            }
        }

        info!("Connection supervisor stopped");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, state = %self.state, "Supervisor command");
        match command {
            Command::Start => {
                if self.state.accepts_start() {
                    self.begin_connect();
                } else {
                    debug!(state = %self.state, "Start ignored");
                    self.events
                        .status(format!("start ignored: connection is {}", self.state));
                }
            }
            Command::Restart => {
                info!(state = %self.state, "Restart requested");
                self.leave_online();
                self.teardown().await;
                self.reconnect.reset();
                self.transition(SessionState::Idle);
                self.begin_connect();
            }
            Command::ForceReset => {
                info!(state = %self.state, "Force reset requested");
                self.leave_online();
                self.teardown().await;
                self.purge_credentials().await;
                self.reconnect.reset();
                self.clear_pairing_artifact();
                self.transition(SessionState::Idle);
                self.begin_connect();
            }
            Command::Shutdown => {}
        }
    }

    async fn stop(&mut self) {
        info!(state = %self.state, "Supervisor shutting down");
        self.leave_online();
        self.teardown().await;
        self.clear_pairing_artifact();
        self.transition(SessionState::Idle);
    }

    // ------------------------------------------------------------------------
    // Lifecycle Notifications
    // ------------------------------------------------------------------------

    async fn handle_lifecycle(&mut self, notice: LifecycleNotice) {
        if notice.generation != self.generation {
            debug!(
                generation = notice.generation,
                current = self.generation,
                event = ?notice.event,
                "Dropping stale lifecycle event"
            );
            return;
        }

        match notice.event {
            LifecycleEvent::PairingChallenge { payload } => self.handle_pairing(&payload),
            LifecycleEvent::Open => {
                if !matches!(
                    self.state,
                    SessionState::Connecting | SessionState::AwaitingPairing
                ) {
                    debug!(state = %self.state, "Ignoring open signal");
                    return;
                }
                self.open_signalled = true;
                if self.session.is_some() {
                    self.go_online();
                }
            }
            LifecycleEvent::Closed { reason } => self.handle_close(reason).await,
        }
    }

    fn handle_pairing(&mut self, payload: &str) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::AwaitingPairing
        ) {
            debug!(state = %self.state, "Ignoring pairing challenge");
            return;
        }

        match self.renderer.render(payload) {
            Ok(artifact) => {
                *self.pairing_artifact.write() = Some(artifact.clone());
                self.reconnect.reset();
                self.transition(SessionState::AwaitingPairing);
                self.events.publish(AppEvent::QrReady { artifact });
                info!(generation = self.generation, "Pairing artifact published");
            }
            Err(e) => {
                error!(error = %e, "Failed to render pairing artifact");
                self.events
                    .status(format!("pairing artifact unavailable: {}", e));
            }
        }
    }

    fn go_online(&mut self) {
        self.reconnect.reset();
        self.clear_pairing_artifact();
        self.transition(SessionState::Online);
        self.events.publish(AppEvent::Connected);
    }

    async fn handle_close(&mut self, reason: DisconnectReason) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::AwaitingPairing | SessionState::Online
        ) {
            debug!(state = %self.state, %reason, "Ignoring close signal");
            return;
        }

        info!(
            generation = self.generation,
            code = reason.status_code(),
            %reason,
            "Session closed"
        );
        self.transition(SessionState::Closing);
        self.teardown().await;
        self.events.publish(AppEvent::Disconnected { reason });

        if reason.is_authoritative() {
            warn!(%reason, "Session invalidated; purging credentials");
            self.purge_credentials().await;
            self.clear_pairing_artifact();
            self.reconnect.reset();
            self.transition(SessionState::LoggedOut);
            self.events.publish(AppEvent::LoggedOut);
            return;
        }

        self.transition(SessionState::Reconnecting);
        let delay = if reason.is_restart_required() {
            self.reconnect.next_immediate()
        } else {
            self.reconnect.next_delay()
        };
        self.schedule_or_give_up(delay);
    }

    // ------------------------------------------------------------------------
    // Internal Events
    // ------------------------------------------------------------------------

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Constructed { generation, result } => {
                let awaiting = matches!(
                    self.state,
                    SessionState::Connecting | SessionState::AwaitingPairing
                );
                if generation != self.generation || !awaiting {
                    debug!(generation, current = self.generation, "Discarding stale session");
                    if let Ok(session) = result {
                        session.close().await;
                    }
                    return;
                }

                match result {
                    Ok(session) => {
                        debug!(generation, "Session constructed");
                        self.session = Some(session);
                        if self.open_signalled {
                            self.go_online();
                        }
                    }
                    Err(e) => {
                        warn!(generation, error = %e, "Session construction failed");
                        self.events
                            .status(format!("session construction failed: {}", e));
                        self.transition(SessionState::Reconnecting);
                        let delay = self.reconnect.next_fixed(self.init_retry_delay);
                        self.schedule_or_give_up(delay);
                    }
                }
            }
            Internal::RetryDue { generation } => {
                self.pending_retry = None;
                if generation != self.generation || self.state != SessionState::Reconnecting {
                    debug!(generation, current = self.generation, "Dropping stale retry");
                    return;
                }
                self.begin_connect();
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn begin_connect(&mut self) {
        self.cancel_pending_retry();
        self.generation += 1;
        self.open_signalled = false;
        self.session = None;
        self.transition(SessionState::Connecting);

        let generation = self.generation;
        info!(
            generation,
            attempt = self.reconnect.attempts(),
            "Connecting session"
        );

        let connector = self.connector.clone();
        let sink = LifecycleSink::new(generation, self.lifecycle_sender.clone());
        let internal = self.internal_sender.clone();
        tokio::spawn(async move {
            let result = connector.connect(sink).await;
            let _ = internal.send(Internal::Constructed { generation, result });
        });
    }

    fn schedule_or_give_up(&mut self, delay: Option<Duration>) {
        match delay {
            Some(delay) => {
                warn!(
                    generation = self.generation,
                    attempt = self.reconnect.attempts(),
                    max_attempts = self.reconnect.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.events.status(format!(
                    "reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    self.reconnect.attempts(),
                    self.reconnect.max_attempts()
                ));
                self.schedule_retry(delay);
            }
            None => {
                let attempts = self.reconnect.attempts();
                error!(attempts, "Reconnect ceiling exceeded; giving up until restart");
                self.transition(SessionState::Unavailable);
                self.events.publish(AppEvent::Unavailable { attempts });
            }
        }
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_pending_retry();
        let generation = self.generation;
        let internal = self.internal_sender.clone();
        self.pending_retry = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = internal.send(Internal::RetryDue { generation });
        }));
    }

    fn cancel_pending_retry(&mut self) {
        if let Some(handle) = self.pending_retry.take() {
            handle.abort();
        }
    }

    /// Publish a non-online state before the live handle is closed so the
    /// dispatcher stops using it first
    fn leave_online(&mut self) {
        if self.state.is_online() || self.session.is_some() {
            self.transition(SessionState::Closing);
        }
    }

    /// Invalidate the current generation and close its session, if any
    async fn teardown(&mut self) {
        self.cancel_pending_retry();
        self.generation += 1;
        self.open_signalled = false;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.publish_snapshot();
    }

    async fn purge_credentials(&mut self) {
        match self.connector.purge_credentials().await {
            Ok(()) => info!("Stored credentials purged"),
            Err(e) => {
                error!(error = %e, "Failed to purge stored credentials");
                self.events
                    .status(format!("credential purge failed: {}", e));
            }
        }
    }

    fn clear_pairing_artifact(&self) {
        *self.pairing_artifact.write() = None;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        let previous = std::mem::replace(&mut self.state, next);
        info!(
            from = %previous,
            to = %next,
            generation = self.generation,
            "Session state changed"
        );
        self.publish_snapshot();
        self.events.status(format!("connection {}", next));
    }

    fn publish_snapshot(&self) {
        let session = if self.state.is_online() {
            self.session.clone()
        } else {
            None
        };
        self.snapshot.send_replace(SupervisorSnapshot {
            state: self.state,
            generation: self.generation,
            session,
        });
    }
}

// ----------------------------------------------------------------------------
// Supervisor Handle
// ----------------------------------------------------------------------------

/// Cloneable handle for driving and observing the supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    command_sender: CommandSender,
    snapshot: watch::Receiver<SupervisorSnapshot>,
    pairing_artifact: Arc<RwLock<Option<String>>>,
}

impl SupervisorHandle {
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Send a command to the supervisor
    pub async fn send_command(&self, command: Command) -> CourierResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| CourierError::channel_error("Connection supervisor is not running"))
    }

    pub async fn start(&self) -> CourierResult<()> {
        self.send_command(Command::Start).await
    }

    pub async fn restart(&self) -> CourierResult<()> {
        self.send_command(Command::Restart).await
    }

    pub async fn force_reset(&self) -> CourierResult<()> {
        self.send_command(Command::ForceReset).await
    }

    pub async fn shutdown(&self) -> CourierResult<()> {
        self.send_command(Command::Shutdown).await
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn is_online(&self) -> bool {
        self.snapshot.borrow().is_online()
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Send-capable session handle; `None` unless Online
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.snapshot.borrow().session()
    }

    /// Latest pairing artifact, kept until the session goes Online
    pub fn pairing_artifact(&self) -> Option<String> {
        self.pairing_artifact.read().clone()
    }

    /// A fresh receiver for snapshot changes
    pub fn watch(&self) -> watch::Receiver<SupervisorSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> CourierResult<SessionState>
    where
        F: FnMut(SessionState) -> bool,
    {
        let mut receiver = self.snapshot.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot.state))
            .await
            .map_err(|_| CourierError::channel_error("Connection supervisor stopped"))?;
        Ok(snapshot.state)
    }
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("snapshot", &*self.snapshot.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::RawPayloadRenderer;
    use courier_harness::{ConnectScript, MockConnector};

    fn spawn_supervisor(
        connector: MockConnector,
    ) -> (SupervisorHandle, EventBus, CancellationToken) {
        let events = EventBus::new(&ChannelConfig::testing());
        let token = CancellationToken::new();
        let (supervisor, handle) = ConnectionSupervisor::new(
            Arc::new(connector),
            Arc::new(RawPayloadRenderer),
            &ReconnectConfig::testing(),
            &ChannelConfig::testing(),
            events.clone(),
            token.clone(),
        );
        tokio::spawn(supervisor.run());
        (handle, events, token)
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_idle() {
        let (handle, _events, token) = spawn_supervisor(MockConnector::new());
        assert_eq!(handle.state(), SessionState::Idle);
        assert!(handle.session().is_none());
        assert!(handle.pairing_artifact().is_none());
        token.cancel();
    }

    #[tokio::test]
    async fn test_start_reaches_online_with_session() {
        let (handle, _events, token) = spawn_supervisor(MockConnector::new());
        handle.start().await.unwrap();
        handle
            .wait_for_state(|s| s == SessionState::Online)
            .await
            .unwrap();
        assert!(handle.session().is_some());
        assert!(handle.snapshot().generation > 0);
        token.cancel();
    }

    #[tokio::test]
    async fn test_pairing_artifact_cached_until_online() {
        let connector = MockConnector::with_default(ConnectScript::pair_only("2@pairing-ref"));
        let (handle, _events, token) = spawn_supervisor(connector.clone());

        handle.start().await.unwrap();
        handle
            .wait_for_state(|s| s == SessionState::AwaitingPairing)
            .await
            .unwrap();
        assert_eq!(handle.pairing_artifact().as_deref(), Some("2@pairing-ref"));

        assert!(connector.complete_pairing());
        handle
            .wait_for_state(|s| s == SessionState::Online)
            .await
            .unwrap();
        assert!(handle.pairing_artifact().is_none());
        token.cancel();
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_supervisor() {
        let (handle, _events, token) = spawn_supervisor(MockConnector::new());
        handle.shutdown().await.unwrap();
        token.cancel();
        tokio::task::yield_now().await;
        // Receiver side is gone once the actor exits
        let err = loop {
            match handle.start().await {
                Err(e) => break e,
                Ok(()) => tokio::task::yield_now().await,
            }
        };
        assert!(matches!(err, CourierError::Channel { .. }));
    }
}
