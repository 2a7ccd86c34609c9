//! Courier application wrapper used by the CLI commands

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use courier_core::{AppEvent, AppEventReceiver, BatchEnd, CourierError, ItemOutcome};
use courier_harness::SimulatedConnector;
use courier_runtime::{RuntimeBuilder, RuntimeHandle};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::QrFormat;
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::render::QrRenderer;

/// A running runtime plus the event subscription that reports on it
pub struct CourierApp {
    runtime: RuntimeHandle,
    events: AppEventReceiver,
    credentials_dir: PathBuf,
    connect_timeout: Duration,
    json: bool,
}

impl CourierApp {
    pub async fn new(
        config: &AppConfig,
        credentials_dir: PathBuf,
        qr: QrFormat,
        json: bool,
    ) -> Result<Self> {
        info!("Using credentials directory: {}", credentials_dir.display());
        let connector = SimulatedConnector::new(credentials_dir.clone())
            .with_pairing_delay(config.cli.pairing_delay());

        let runtime = RuntimeBuilder::new(Arc::new(connector))
            .with_config(config.engine.clone())
            .with_renderer(Arc::new(QrRenderer::new(qr)))
            .build_and_start()
            .await?;
        let events = runtime.subscribe();

        Ok(Self {
            runtime,
            events,
            credentials_dir,
            connect_timeout: config.cli.connect_timeout(),
            json,
        })
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn credentials_dir(&self) -> &PathBuf {
        &self.credentials_dir
    }

    /// Start the session and wait for it to come online
    pub async fn connect(&mut self) -> Result<()> {
        self.runtime.start().await?;
        self.wait_online().await
    }

    /// Purge credentials, pair again and wait for the new session
    pub async fn reset(&mut self) -> Result<()> {
        self.runtime.force_reset().await?;
        self.wait_online().await
    }

    async fn wait_online(&mut self) -> Result<()> {
        let timeout = self.connect_timeout;
        tokio::time::timeout(timeout, self.follow_until_online())
            .await
            .map_err(|_| {
                CliError::Timeout(format!("session not online after {}s", timeout.as_secs()))
            })?
    }

    async fn follow_until_online(&mut self) -> Result<()> {
        loop {
            let event = self.next_event().await?;
            self.report(&event)?;
            match event {
                AppEvent::Connected => return Ok(()),
                AppEvent::LoggedOut => return Err(CliError::LoggedOut),
                AppEvent::Unavailable { attempts } => {
                    return Err(CliError::Unavailable { attempts })
                }
                _ => {}
            }
        }
    }

    /// Next event from the runtime; lag is logged and skipped
    pub async fn next_event(&mut self) -> Result<AppEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Ok(event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
                Err(RecvError::Closed) => {
                    return Err(CourierError::channel_error("Event stream closed").into())
                }
            }
        }
    }

    /// Print an event for the user
    pub fn report(&self, event: &AppEvent) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }
        match describe(event) {
            Some(line) => println!("{}", line),
            None => {
                if let AppEvent::Status { text } = event {
                    info!("{}", text);
                }
            }
        }
        Ok(())
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.runtime.shutdown().await?;
        Ok(())
    }
}

/// Human-readable line for an event; statuses go to the log instead
pub fn describe(event: &AppEvent) -> Option<String> {
    let line = match event {
        AppEvent::QrReady { artifact } => {
            format!("Scan this code with the phone app to link it:\n{}", artifact)
        }
        AppEvent::Status { .. } => return None,
        AppEvent::Connected => "Connected".to_string(),
        AppEvent::Disconnected { reason } => {
            format!("Disconnected: {} ({})", reason, reason.status_code())
        }
        AppEvent::LoggedOut => "Logged out; stored credentials were removed".to_string(),
        AppEvent::Unavailable { attempts } => format!(
            "Connection unavailable after {} attempts; run again to retry",
            attempts
        ),
        AppEvent::ItemResult {
            recipient,
            index,
            total,
            outcome,
            detail,
            ..
        } => {
            let label = match outcome {
                ItemOutcome::Sent => "sent",
                ItemOutcome::Failed => "failed",
                ItemOutcome::SkippedDuplicate => "duplicate",
                ItemOutcome::SkippedCooldown => "cooling down",
            };
            match detail {
                Some(detail) => format!("[{}/{}] {} {} ({})", index, total, recipient, label, detail),
                None => format!("[{}/{}] {} {}", index, total, recipient, label),
            }
        }
        AppEvent::BatchSummary {
            sent,
            failed,
            skipped_cooldown,
            skipped_quota,
            skipped_duplicate,
            end,
            ..
        } => {
            let end = match end {
                BatchEnd::Completed => "completed",
                BatchEnd::QuotaExhausted => "daily cap reached",
                BatchEnd::ConnectionLost => "connection lost",
            };
            format!(
                "Done ({}): {} sent, {} failed, {} cooling down, {} over daily cap, {} duplicates",
                end, sent, failed, skipped_cooldown, skipped_quota, skipped_duplicate
            )
        }
    };
    Some(line)
}
