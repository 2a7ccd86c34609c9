//! Courier Runtime Engine
//!
//! The moving parts of the courier dispatch engine:
//! - `ConnectionSupervisor`: owns the chat session and its reconnect state machine
//! - `BatchDispatcher`: single-flight, paced, quota- and cooldown-aware batch sending
//! - `CooldownStore` / `DailyQuotaTracker`: process-lifetime safety ledgers
//! - `RuntimeBuilder` / `RuntimeHandle`: wiring and the consumer-facing handle
//!
//! `courier-core` provides the stable types and collaborator traits; this
//! crate is the engine that drives them.

pub mod backoff;
pub mod builder;
pub mod cooldown;
pub mod dispatcher;
pub mod events;
pub mod pacing;
pub mod quota;
pub mod supervisor;

pub use backoff::ReconnectContext;
pub use builder::{create_test_runtime, RuntimeBuilder, RuntimeHandle, SafetyInfo};
pub use cooldown::CooldownStore;
pub use dispatcher::{BatchDispatcher, DispatchJob, DispatchSummary, DispatchTicket};
pub use events::EventBus;
pub use pacing::Pacer;
pub use quota::DailyQuotaTracker;
pub use supervisor::{ConnectionSupervisor, SupervisorHandle, SupervisorSnapshot};

// Re-export core types for convenience
pub use courier_core::{
    AppEvent, AppEventReceiver, BatchEnd, Command, CourierConfig, CourierError, CourierResult,
    DisconnectReason, DispatchRejection, ItemOutcome, PairingRenderer, Session, SessionConnector,
    SessionState, TimeSource,
};
