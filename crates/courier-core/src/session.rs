//! Session abstraction for courier
//!
//! The engine never speaks the chat protocol itself. It drives an external
//! client through these collaborator traits, which keeps the supervisor and
//! dispatcher testable against scripted sessions.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::{
    LifecycleEvent, LifecycleNotice, LifecycleSender, NonBlockingSend, Presence,
};
use crate::errors::{CourierResult, SendError};
use crate::types::Recipient;

// ----------------------------------------------------------------------------
// Session Traits
// ----------------------------------------------------------------------------

/// Builds sessions and owns their persisted credentials
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Construct a new session. Lifecycle notifications for it must be
    /// delivered through `sink`; the returned handle is only used for
    /// sending once the sink has reported [`LifecycleEvent::Open`].
    async fn connect(&self, sink: LifecycleSink) -> CourierResult<Arc<dyn Session>>;

    /// Remove stored credentials so that the next connect requires pairing
    async fn purge_credentials(&self) -> CourierResult<()>;
}

/// A live, send-capable session
#[async_trait]
pub trait Session: Send + Sync {
    /// Send a text message to a recipient
    async fn send_text(&self, to: &Recipient, body: &str) -> Result<(), SendError>;

    /// Update the presence shown to a recipient
    async fn send_presence(&self, to: &Recipient, presence: Presence) -> Result<(), SendError>;

    /// Tear the session down; must not emit further lifecycle events
    async fn close(&self);
}

/// Converts a raw pairing payload into something a human can scan
pub trait PairingRenderer: Send + Sync {
    fn render(&self, payload: &str) -> CourierResult<String>;
}

/// Renderer that publishes the raw payload unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPayloadRenderer;

impl PairingRenderer for RawPayloadRenderer {
    fn render(&self, payload: &str) -> CourierResult<String> {
        Ok(payload.to_string())
    }
}

// ----------------------------------------------------------------------------
// Lifecycle Sink
// ----------------------------------------------------------------------------

/// Per-session handle for pushing lifecycle notifications to the supervisor
///
/// Each sink is stamped with the generation of the connect attempt that
/// created it; the supervisor drops notifications from older generations.
#[derive(Debug, Clone)]
pub struct LifecycleSink {
    generation: u64,
    sender: LifecycleSender,
}

impl LifecycleSink {
    pub fn new(generation: u64, sender: LifecycleSender) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event; returns false once the supervisor has gone away
    pub async fn emit(&self, event: LifecycleEvent) -> bool {
        let delivered = self
            .sender
            .send(LifecycleNotice {
                generation: self.generation,
                event,
            })
            .await
            .is_ok();
        if !delivered {
            debug!(generation = self.generation, "Supervisor gone; lifecycle event dropped");
        }
        delivered
    }

    /// Deliver an event from a synchronous callback
    pub fn try_emit(&self, event: LifecycleEvent) -> bool {
        match self.sender.try_send_non_blocking(LifecycleNotice {
            generation: self.generation,
            event,
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!(generation = self.generation, "Lifecycle event dropped: {}", e);
                false
            }
        }
    }
}
