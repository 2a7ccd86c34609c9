//! Simulated Session Connector
//!
//! A local stand-in for the chat client that keeps its state on disk:
//! - `creds.json` in the credentials directory marks a paired device
//! - without it, connect emits a pairing challenge and "scans" it after a delay
//! - accepted messages are appended to `outbox.jsonl` instead of leaving the host
//!
//! Used by the CLI for demos and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, CourierResult, LifecycleEvent, LifecycleSink, Presence, Recipient, SendError,
    Session, SessionConnector,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CREDENTIALS_FILE: &str = "creds.json";
pub const OUTBOX_FILE: &str = "outbox.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub device_id: Uuid,
    pub paired_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct OutboxEntry<'a> {
    at: DateTime<Utc>,
    to: &'a str,
    body: &'a str,
}

// ----------------------------------------------------------------------------
// Simulated Connector
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    credentials_dir: PathBuf,
    pairing_delay: Duration,
}

impl SimulatedConnector {
    pub fn new<P: Into<PathBuf>>(credentials_dir: P) -> Self {
        Self {
            credentials_dir: credentials_dir.into(),
            pairing_delay: Duration::from_secs(3),
        }
    }

    /// How long the simulated phone takes to scan a pairing challenge
    pub fn with_pairing_delay(mut self, delay: Duration) -> Self {
        self.pairing_delay = delay;
        self
    }

    pub fn credentials_dir(&self) -> &Path {
        &self.credentials_dir
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_dir.join(CREDENTIALS_FILE)
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.credentials_dir.join(OUTBOX_FILE)
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials_path().is_file()
    }

    /// Stored credentials; unreadable files count as absent
    pub async fn load_credentials(&self) -> Option<StoredCredentials> {
        let raw = match tokio::fs::read(self.credentials_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, "Could not read stored credentials");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed credentials file");
                None
            }
        }
    }
}

async fn store_credentials(path: &Path) -> std::io::Result<StoredCredentials> {
    let credentials = StoredCredentials {
        device_id: Uuid::new_v4(),
        paired_at: Utc::now(),
    };
    let json = serde_json::to_vec_pretty(&credentials)?;
    tokio::fs::write(path, json).await?;
    Ok(credentials)
}

#[async_trait]
impl SessionConnector for SimulatedConnector {
    async fn connect(&self, sink: LifecycleSink) -> CourierResult<Arc<dyn Session>> {
        tokio::fs::create_dir_all(&self.credentials_dir)
            .await
            .map_err(|e| {
                CourierError::construction_failed(format!(
                    "cannot use credentials directory {}: {}",
                    self.credentials_dir.display(),
                    e
                ))
            })?;

        let session = Arc::new(SimulatedSession {
            outbox: self.outbox_path(),
            closed: Arc::new(AtomicBool::new(false)),
            pairing: Mutex::new(None),
        });

        if let Some(credentials) = self.load_credentials().await {
            info!(device = %credentials.device_id, "Restored paired device");
            sink.emit(LifecycleEvent::Open).await;
            return Ok(session);
        }

        let payload = format!("courier-pair:{}", Uuid::new_v4());
        info!(generation = sink.generation(), "No stored credentials; pairing required");
        sink.emit(LifecycleEvent::PairingChallenge { payload }).await;

        let delay = self.pairing_delay;
        let path = self.credentials_path();
        let closed = session.closed.clone();
        let scan = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if closed.load(Ordering::Acquire) {
                return;
            }
            match store_credentials(&path).await {
                Ok(credentials) => {
                    info!(device = %credentials.device_id, "Simulated device paired");
                    sink.emit(LifecycleEvent::Open).await;
                }
                Err(e) => {
                    warn!(error = %e, "Could not store credentials after pairing");
                    sink.emit(LifecycleEvent::Closed {
                        reason: courier_core::DisconnectReason::BadSession,
                    })
                    .await;
                }
            }
        });
        *session.pairing.lock() = Some(scan);

        Ok(session)
    }

    async fn purge_credentials(&self) -> CourierResult<()> {
        match tokio::fs::remove_file(self.credentials_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CourierError::credentials(e.to_string())),
        }
    }
}

// ----------------------------------------------------------------------------
// Simulated Session
// ----------------------------------------------------------------------------

struct SimulatedSession {
    outbox: PathBuf,
    closed: Arc<AtomicBool>,
    pairing: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Session for SimulatedSession {
    async fn send_text(&self, to: &Recipient, body: &str) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::NotConnected);
        }

        let entry = OutboxEntry {
            at: Utc::now(),
            to: to.address(),
            body,
        };
        let mut line = serde_json::to_vec(&entry).map_err(|e| SendError::Rejected {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox)
            .await
            .map_err(|e| SendError::Rejected {
                reason: format!("outbox unavailable: {}", e),
            })?;
        file.write_all(&line)
            .await
            .map_err(|e| SendError::Rejected {
                reason: format!("outbox write failed: {}", e),
            })?;
        Ok(())
    }

    async fn send_presence(&self, to: &Recipient, presence: Presence) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::NotConnected);
        }
        debug!(recipient = %to.masked(), ?presence, "Simulated presence");
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(scan) = self.pairing.lock().take() {
            scan.abort();
        }
    }
}
