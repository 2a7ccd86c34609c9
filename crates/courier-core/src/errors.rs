//! Error types for courier
//!
//! This module contains all error types used throughout the engine:
//! session construction faults, per-recipient send faults, configuration
//! problems, and the main CourierError type that unifies them.
//!
//! Policy outcomes (job already in flight, not online, cooldown, quota) are
//! not errors. They are modelled by [`DispatchRejection`] and by the item
//! outcomes carried on status events.

use crate::channel::SessionState;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Session establishment and lifetime errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session construction failed: {reason}")]
    ConstructionFailed { reason: String },
    #[error("Session is not connected")]
    NotConnected,
    #[error("Session closed: {reason}")]
    Closed { reason: String },
}

/// Errors reported by the session layer for a single outbound message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Send rejected: {reason}")]
    Rejected { reason: String },
    #[error("Send timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Session is not connected")]
    NotConnected,
}

/// Invalid or contradictory configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch Rejection
// ----------------------------------------------------------------------------

/// Named reasons a dispatch job is refused before any state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchRejection {
    #[error("A dispatch job is already in flight")]
    AlreadyInFlight,
    #[error("Session is not online (state: {state})")]
    NotOnline { state: SessionState },
    #[error("Dispatch job has no recipients")]
    EmptyBatch,
    #[error("Dispatch job has an empty message body")]
    EmptyMessage,
}

impl DispatchRejection {
    /// Short machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            DispatchRejection::AlreadyInFlight => "already-in-flight",
            DispatchRejection::NotOnline { .. } => "not-online",
            DispatchRejection::EmptyBatch => "empty-batch",
            DispatchRejection::EmptyMessage => "empty-message",
        }
    }
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Main error type for courier
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch rejected: {0}")]
    Rejected(#[from] DispatchRejection),

    #[error("Invalid recipient: {raw:?} contains no digits")]
    InvalidRecipient { raw: String },

    #[error("Channel communication error: {message}")]
    Channel { message: String },

    #[error("Pairing artifact rendering failed: {reason}")]
    Rendering { reason: String },

    #[error("Credential store error: {reason}")]
    Credentials { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl CourierError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        CourierError::Channel {
            message: message.into(),
        }
    }

    /// Create a session construction error
    pub fn construction_failed<R: Into<String>>(reason: R) -> Self {
        CourierError::Session(SessionError::ConstructionFailed {
            reason: reason.into(),
        })
    }

    /// Create a rendering error
    pub fn rendering<R: Into<String>>(reason: R) -> Self {
        CourierError::Rendering {
            reason: reason.into(),
        }
    }

    /// Create a credential store error
    pub fn credentials<R: Into<String>>(reason: R) -> Self {
        CourierError::Credentials {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, CourierError>;
pub type CourierResult<T> = Result<T>;
