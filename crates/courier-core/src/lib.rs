//! Courier Core
//!
//! Foundational types for the courier paced dispatch engine: recipient
//! normalization, time sources, configuration, the error taxonomy, channel
//! message types and the collaborator traits through which the engine
//! drives an external session client.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_app_event_channel, create_command_channel, create_lifecycle_channel, AppEvent,
    AppEventReceiver, AppEventSender, BatchEnd, ChannelError, Command, CommandReceiver,
    CommandSender, DisconnectReason, ItemOutcome, LifecycleEvent, LifecycleNotice,
    LifecycleReceiver, LifecycleSender, NonBlockingSend, Presence, SessionState,
};
pub use config::{
    AddressingConfig, ChannelConfig, CooldownConfig, CourierConfig, PacingConfig, QuotaConfig,
    ReconnectConfig,
};
pub use errors::{
    ConfigError, CourierError, CourierResult, DispatchRejection, Result, SendError, SessionError,
};
pub use session::{
    LifecycleSink, PairingRenderer, RawPayloadRenderer, Session, SessionConnector,
};
pub use types::{
    parse_recipient_list, CalendarDay, JobId, Recipient, RecipientNormalizer, SystemTimeSource,
    TimeSource, Timestamp,
};
