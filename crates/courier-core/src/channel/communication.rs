//! Channel Communication Protocol Types
//!
//! All traffic between the caller, the connection supervisor, the session
//! layer and observers flows through these message types.

use crate::types::JobId;
use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Command: Caller → Supervisor
// ----------------------------------------------------------------------------

/// Commands sent from the caller to the connection supervisor task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Begin establishing a session (accepted from Idle or LoggedOut)
    Start,
    /// Drop any retry bookkeeping and start again from any state
    Restart,
    /// Purge stored credentials, tear down the session and start clean
    ForceReset,
    /// Stop the supervisor, cancel pending retries and close the session
    Shutdown,
}

// ----------------------------------------------------------------------------
// LifecycleEvent: Session Layer → Supervisor
// ----------------------------------------------------------------------------

/// Push notifications from the external session client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// The client needs the user to pair; payload is the raw challenge
    PairingChallenge { payload: String },
    /// Handshake succeeded, the session can send
    Open,
    /// The connection closed for the given reason
    Closed { reason: DisconnectReason },
}

/// A lifecycle event tagged with the supervisor generation that created the
/// session it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleNotice {
    pub generation: u64,
    pub event: LifecycleEvent,
}

/// Classified close signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    ConnectionClosed,
    ConnectionLost,
    TimedOut,
    ConnectionReplaced,
    RestartRequired,
    BadSession,
    LoggedOut,
    MultideviceMismatch,
    Unknown { code: u16 },
}

impl DisconnectReason {
    /// Map a protocol status code onto a reason
    pub fn from_status_code(code: u16) -> Self {
        match code {
            428 => DisconnectReason::ConnectionClosed,
            408 => DisconnectReason::ConnectionLost,
            440 => DisconnectReason::ConnectionReplaced,
            515 => DisconnectReason::RestartRequired,
            500 => DisconnectReason::BadSession,
            401 => DisconnectReason::LoggedOut,
            411 => DisconnectReason::MultideviceMismatch,
            other => DisconnectReason::Unknown { code: other },
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionLost | DisconnectReason::TimedOut => 408,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::BadSession => 500,
            DisconnectReason::LoggedOut => 401,
            DisconnectReason::MultideviceMismatch => 411,
            DisconnectReason::Unknown { code } => *code,
        }
    }

    /// Authoritative invalidation: credentials are dead and re-pairing is
    /// required. Everything else is treated as transient.
    pub fn is_authoritative(&self) -> bool {
        matches!(
            self,
            DisconnectReason::LoggedOut | DisconnectReason::MultideviceMismatch
        )
    }

    /// The remote asked for an immediate reconnect
    pub fn is_restart_required(&self) -> bool {
        matches!(self, DisconnectReason::RestartRequired)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ConnectionLost => write!(f, "connection lost"),
            DisconnectReason::TimedOut => write!(f, "timed out"),
            DisconnectReason::ConnectionReplaced => write!(f, "connection replaced"),
            DisconnectReason::RestartRequired => write!(f, "restart required"),
            DisconnectReason::BadSession => write!(f, "bad session"),
            DisconnectReason::LoggedOut => write!(f, "logged out"),
            DisconnectReason::MultideviceMismatch => write!(f, "multi-device mismatch"),
            DisconnectReason::Unknown { code } => write!(f, "unknown ({})", code),
        }
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Connection supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingPairing,
    Online,
    Closing,
    Reconnecting,
    LoggedOut,
    Unavailable,
}

impl SessionState {
    pub fn is_online(&self) -> bool {
        matches!(self, SessionState::Online)
    }

    /// States from which a plain `start()` is accepted
    pub fn accepts_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::LoggedOut)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingPairing => "awaiting-pairing",
            SessionState::Online => "online",
            SessionState::Closing => "closing",
            SessionState::Reconnecting => "reconnecting",
            SessionState::LoggedOut => "logged-out",
            SessionState::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Presence updates sent around a simulated typing pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    Composing,
    Paused,
}

// ----------------------------------------------------------------------------
// AppEvent: Engine → Observers
// ----------------------------------------------------------------------------

/// Per-recipient outcome within a dispatch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemOutcome {
    Sent,
    Failed,
    SkippedDuplicate,
    SkippedCooldown,
}

/// Why a dispatch job stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchEnd {
    Completed,
    QuotaExhausted,
    ConnectionLost,
}

/// Events published to every observer, fire-and-forget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AppEvent {
    /// A pairing artifact is ready for display
    QrReady { artifact: String },
    /// Free-form status text for transitions and policy outcomes
    Status { text: String },
    Connected,
    Disconnected { reason: DisconnectReason },
    LoggedOut,
    /// The reconnect ceiling was exceeded; a manual restart is required
    Unavailable { attempts: u32 },
    ItemResult {
        job_id: JobId,
        recipient: String,
        index: usize,
        total: usize,
        outcome: ItemOutcome,
        detail: Option<String>,
    },
    BatchSummary {
        job_id: JobId,
        sent: usize,
        failed: usize,
        skipped_cooldown: usize,
        skipped_quota: usize,
        skipped_duplicate: usize,
        end: BatchEnd,
    },
}

impl AppEvent {
    pub fn status<T: Into<String>>(text: T) -> Self {
        AppEvent::Status { text: text.into() }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
