//! Channel Utilities
//!
//! Typed aliases and constructors for the engine's channels: an mpsc
//! command channel into the supervisor, an mpsc lifecycle channel from
//! session clients, and a broadcast bus for application events.

use crate::channel::communication::{AppEvent, Command, LifecycleNotice};
use crate::config::ChannelConfig;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    ChannelFull,
    ChannelClosed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::ChannelFull => write!(f, "Channel buffer is full"),
            ChannelError::ChannelClosed => write!(f, "Channel is closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for crate::errors::CourierError {
    fn from(err: ChannelError) -> Self {
        crate::errors::CourierError::channel_error(err.to_string())
    }
}

pub type CommandSender = tokio::sync::mpsc::Sender<Command>;
pub type CommandReceiver = tokio::sync::mpsc::Receiver<Command>;
pub type LifecycleSender = tokio::sync::mpsc::Sender<LifecycleNotice>;
pub type LifecycleReceiver = tokio::sync::mpsc::Receiver<LifecycleNotice>;
pub type AppEventSender = tokio::sync::broadcast::Sender<AppEvent>;
pub type AppEventReceiver = tokio::sync::broadcast::Receiver<AppEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (caller → supervisor)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    tokio::sync::mpsc::channel(config.command_buffer_size)
}

/// Create bounded lifecycle channel (session clients → supervisor)
pub fn create_lifecycle_channel(config: &ChannelConfig) -> (LifecycleSender, LifecycleReceiver) {
    tokio::sync::mpsc::channel(config.lifecycle_buffer_size)
}

/// Create the application event bus (engine → observers)
///
/// Receivers are obtained with `sender.subscribe()`; the returned receiver
/// may simply be dropped.
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    tokio::sync::broadcast::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send Utilities
// ----------------------------------------------------------------------------

/// Non-blocking send for callers that must never await a full channel
pub trait NonBlockingSend<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError>;
}

impl NonBlockingSend<Command> for CommandSender {
    fn try_send_non_blocking(&self, command: Command) -> Result<(), ChannelError> {
        self.try_send(command).map_err(|e| match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

impl NonBlockingSend<LifecycleNotice> for LifecycleSender {
    fn try_send_non_blocking(&self, notice: LifecycleNotice) -> Result<(), ChannelError> {
        self.try_send(notice).map_err(|e| match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
