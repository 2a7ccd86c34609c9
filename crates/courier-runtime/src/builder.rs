//! Runtime Builder API
//!
//! Wires the connection supervisor, the batch dispatcher and their shared
//! stores together and hands consumers (CLI, tests) a single handle.

use crate::cooldown::CooldownStore;
use crate::dispatcher::{BatchDispatcher, DispatchJob, DispatchTicket};
use crate::events::EventBus;
use crate::pacing::Pacer;
use crate::quota::DailyQuotaTracker;
use crate::supervisor::{ConnectionSupervisor, SupervisorHandle};
use courier_core::{
    AppEventReceiver, Command, CommandSender, CourierConfig, CourierError, CourierResult,
    DispatchRejection, PairingRenderer, RawPayloadRenderer, RecipientNormalizer,
    SessionConnector, SessionState, SystemTimeSource, TimeSource,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a courier runtime around one session connector
pub struct RuntimeBuilder {
    connector: Arc<dyn SessionConnector>,
    renderer: Arc<dyn PairingRenderer>,
    time_source: Arc<dyn TimeSource>,
    config: CourierConfig,
    pacing_seed: Option<u64>,
    auto_start: bool,
}

impl RuntimeBuilder {
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            renderer: Arc::new(RawPayloadRenderer),
            time_source: Arc::new(SystemTimeSource),
            config: CourierConfig::default(),
            pacing_seed: None,
            auto_start: false,
        }
    }

    pub fn with_config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Renderer used to turn pairing payloads into a displayable artifact
    pub fn with_renderer(mut self, renderer: Arc<dyn PairingRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Fix the pacing RNG seed
    pub fn with_pacing_seed(mut self, seed: u64) -> Self {
        self.pacing_seed = Some(seed);
        self
    }

    /// Issue `Start` as soon as the supervisor is running
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// Build and start the runtime
    pub async fn build_and_start(self) -> CourierResult<RuntimeHandle> {
        self.config.validate()?;
        info!("Building courier runtime");

        let config = self.config;
        let shutdown = CancellationToken::new();
        let events = EventBus::new(&config.channels);

        let (supervisor, supervisor_handle) = ConnectionSupervisor::new(
            self.connector,
            self.renderer,
            &config.reconnect,
            &config.channels,
            events.clone(),
            shutdown.clone(),
        );

        let cooldown = Arc::new(CooldownStore::new(
            config.cooldown.window_ms,
            self.time_source.clone(),
        ));
        let quota = Arc::new(DailyQuotaTracker::new(
            config.quota.daily_message_cap,
            self.time_source.clone(),
        ));
        let pacer = match self.pacing_seed {
            Some(seed) => Pacer::with_seed(config.pacing.clone(), seed),
            None => Pacer::new(config.pacing.clone()),
        };

        let dispatcher = Arc::new(BatchDispatcher::new(
            RecipientNormalizer::new(config.addressing.clone()),
            pacer,
            cooldown.clone(),
            quota,
            supervisor_handle.watch(),
            events.clone(),
            self.time_source,
        ));

        let supervisor_task = tokio::spawn(supervisor.run());
        let prune_task = spawn_prune_task(
            cooldown,
            Duration::from_millis(config.cooldown.prune_interval_ms),
            shutdown.clone(),
        );

        if self.auto_start {
            supervisor_handle.start().await?;
        }

        info!("Courier runtime started");

        Ok(RuntimeHandle {
            config,
            supervisor: supervisor_handle,
            dispatcher,
            events,
            shutdown,
            supervisor_task: Some(supervisor_task),
            prune_task,
            running: true,
        })
    }
}

fn spawn_prune_task(
    cooldown: Arc<CooldownStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let pruned = cooldown.prune_expired();
                    if pruned > 0 {
                        debug!(pruned, remaining = cooldown.len(), "Pruned cooldown entries");
                    }
                }
            }
        }
    }))
}

// ----------------------------------------------------------------------------
// Safety Info
// ----------------------------------------------------------------------------

/// Read-only view of the current safety limits and usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyInfo {
    pub session_state: SessionState,
    pub job_in_flight: bool,
    pub daily_cap: u32,
    pub sent_today: u32,
    pub remaining_today: u32,
    pub cooldown_window_ms: u64,
    pub tracked_recipients: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub session_break_every_n: u32,
    pub session_break_duration_ms: u64,
    pub simulate_typing: bool,
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running courier runtime
pub struct RuntimeHandle {
    config: CourierConfig,
    supervisor: SupervisorHandle,
    dispatcher: Arc<BatchDispatcher>,
    events: EventBus,
    shutdown: CancellationToken,
    supervisor_task: Option<JoinHandle<()>>,
    prune_task: Option<JoinHandle<()>>,
    running: bool,
}

impl RuntimeHandle {
    pub async fn start(&self) -> CourierResult<()> {
        self.supervisor.start().await
    }

    pub async fn restart(&self) -> CourierResult<()> {
        self.supervisor.restart().await
    }

    /// Purge stored credentials and pair from scratch
    pub async fn force_reset(&self) -> CourierResult<()> {
        self.supervisor.force_reset().await
    }

    pub fn state(&self) -> SessionState {
        self.supervisor.state()
    }

    pub fn is_online(&self) -> bool {
        self.supervisor.is_online()
    }

    pub fn pairing_artifact(&self) -> Option<String> {
        self.supervisor.pairing_artifact()
    }

    /// Submit a batch; runs in the background once accepted
    pub fn submit<I, S>(
        &self,
        recipients: I,
        message: impl Into<String>,
    ) -> Result<DispatchTicket, DispatchRejection>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit_job(DispatchJob::new(recipients, message))
    }

    pub fn submit_job(&self, job: DispatchJob) -> Result<DispatchTicket, DispatchRejection> {
        self.dispatcher.submit(job)
    }

    pub fn subscribe(&self) -> AppEventReceiver {
        self.events.subscribe()
    }

    pub fn query_safety_info(&self) -> SafetyInfo {
        let quota = self.dispatcher.quota();
        let pacing = &self.config.pacing;
        SafetyInfo {
            session_state: self.state(),
            job_in_flight: self.dispatcher.is_in_flight(),
            daily_cap: quota.cap(),
            sent_today: quota.sent_today(),
            remaining_today: quota.remaining(),
            cooldown_window_ms: self.config.cooldown.window_ms,
            tracked_recipients: self.dispatcher.cooldown().len(),
            min_delay_ms: pacing.min_delay_ms,
            max_delay_ms: pacing.max_delay_ms,
            session_break_every_n: pacing.session_break_every_n,
            session_break_duration_ms: pacing.session_break_duration_ms,
            simulate_typing: pacing.simulate_typing,
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    pub fn dispatcher(&self) -> &Arc<BatchDispatcher> {
        &self.dispatcher
    }

    pub fn cooldown(&self) -> &Arc<CooldownStore> {
        self.dispatcher.cooldown()
    }

    pub fn quota(&self) -> &Arc<DailyQuotaTracker> {
        self.dispatcher.quota()
    }

    pub fn command_sender(&self) -> CommandSender {
        self.supervisor.command_sender()
    }

    pub async fn send_command(&self, command: Command) -> CourierResult<()> {
        self.supervisor.send_command(command).await
    }

    /// Check if the runtime is still running
    pub fn is_running(&self) -> bool {
        self.running
            && self
                .supervisor_task
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }

    /// Wait for the supervisor to exit
    pub async fn wait(&mut self) -> CourierResult<()> {
        if let Some(handle) = self.supervisor_task.take() {
            handle.await.map_err(|e| {
                CourierError::channel_error(format!("Supervisor task panicked: {}", e))
            })?;
        }
        Ok(())
    }

    /// Shutdown the runtime gracefully
    pub async fn shutdown(&mut self) -> CourierResult<()> {
        info!("Shutting down courier runtime");

        let _ = self.send_command(Command::Shutdown).await;
        if let Some(handle) = self.supervisor_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
        }

        self.shutdown.cancel();
        if let Some(handle) = self.prune_task.take() {
            let _ = handle.await;
        }

        self.running = false;
        info!("Courier runtime shut down");
        Ok(())
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Runtime with fast pacing, short windows and a fixed seed
pub async fn create_test_runtime(
    connector: Arc<dyn SessionConnector>,
    time_source: Arc<dyn TimeSource>,
) -> CourierResult<RuntimeHandle> {
    RuntimeBuilder::new(connector)
        .with_config(CourierConfig::testing())
        .with_time_source(time_source)
        .with_pacing_seed(7)
        .build_and_start()
        .await
}
