//! Channel Module
//!
//! This module contains the channel infrastructure:
//! - `communication`: commands, lifecycle events, states and app events
//! - `utils`: channel aliases, constructors and non-blocking send helpers

pub mod communication;
pub mod utils;

// Re-export communication types
pub use communication::{
    AppEvent, BatchEnd, Command, DisconnectReason, ItemOutcome, LifecycleEvent, LifecycleNotice,
    Presence, SessionState,
};

// Re-export ChannelConfig from config module
pub use crate::config::ChannelConfig;

// Re-export utility types
pub use utils::{
    create_app_event_channel, create_command_channel, create_lifecycle_channel, AppEventReceiver,
    AppEventSender, ChannelError, CommandReceiver, CommandSender, LifecycleReceiver,
    LifecycleSender, NonBlockingSend,
};
