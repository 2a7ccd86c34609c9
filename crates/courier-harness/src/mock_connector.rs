//! Scriptable Session Connector for Testing
//!
//! `MockConnector` plays the role of the external chat client. Each connect
//! attempt consumes one [`ConnectScript`] (or the default) that decides which
//! lifecycle notifications the attempt produces. The sessions it hands out
//! record every send and presence update and can be told to reject specific
//! recipients or to drop the connection after a number of sends.

use async_trait::async_trait;
use courier_core::{
    CourierError, CourierResult, DisconnectReason, LifecycleEvent, LifecycleSink, Presence,
    Recipient, SendError, Session, SessionConnector,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ----------------------------------------------------------------------------
// Connect Scripts
// ----------------------------------------------------------------------------

/// What a single connect attempt does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectScript {
    /// Construct a session and signal open straight away
    Open,
    /// Emit a pairing challenge, then signal open
    PairThenOpen { payload: String },
    /// Emit a pairing challenge and wait for [`MockConnector::complete_pairing`]
    PairOnly { payload: String },
    /// Fail to construct the session
    Fail { reason: String },
    /// Construct a session that closes immediately with `reason`
    CloseWith(DisconnectReason),
    /// Construct a session that never reports anything
    Silent,
}

impl ConnectScript {
    pub fn pair_then_open<P: Into<String>>(payload: P) -> Self {
        Self::PairThenOpen {
            payload: payload.into(),
        }
    }

    pub fn pair_only<P: Into<String>>(payload: P) -> Self {
        Self::PairOnly {
            payload: payload.into(),
        }
    }

    pub fn fail<R: Into<String>>(reason: R) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }
}

/// A message accepted by a mock session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub address: String,
    pub body: String,
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

struct Attempt {
    sink: LifecycleSink,
    closed: Arc<AtomicBool>,
}

struct ConnectorState {
    scripts: VecDeque<ConnectScript>,
    default_script: ConnectScript,
    attempts: Vec<Attempt>,
    connect_count: u32,
    purge_count: u32,
    failing: HashSet<String>,
    drop_after_sends: Option<(usize, DisconnectReason)>,
    send_latency: Duration,
    sent: Vec<SentMessage>,
    presences: Vec<(String, Presence)>,
}

impl ConnectorState {
    fn latest(&self) -> Option<&Attempt> {
        self.attempts.last()
    }
}

// ----------------------------------------------------------------------------
// Mock Connector
// ----------------------------------------------------------------------------

/// Scriptable stand-in for the external chat client
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    /// Every attempt opens immediately
    pub fn new() -> Self {
        Self::with_default(ConnectScript::Open)
    }

    /// Use `script` for every attempt that has no queued script
    pub fn with_default(script: ConnectScript) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectorState {
                scripts: VecDeque::new(),
                default_script: script,
                attempts: Vec::new(),
                connect_count: 0,
                purge_count: 0,
                failing: HashSet::new(),
                drop_after_sends: None,
                send_latency: Duration::ZERO,
                sent: Vec::new(),
                presences: Vec::new(),
            })),
        }
    }

    /// Queue a script for the next unscripted attempt
    pub fn push_script(&self, script: ConnectScript) -> &Self {
        self.state.lock().scripts.push_back(script);
        self
    }

    /// Reject every send to `digits`
    pub fn fail_recipient<D: Into<String>>(&self, digits: D) -> &Self {
        self.state.lock().failing.insert(digits.into());
        self
    }

    /// Drop the live connection once `count` messages have been accepted
    pub fn drop_after_sends(&self, count: usize) -> &Self {
        self.state.lock().drop_after_sends = Some((count, DisconnectReason::ConnectionLost));
        self
    }

    pub fn with_send_latency(self, latency: Duration) -> Self {
        self.state.lock().send_latency = latency;
        self
    }

    /// Signal Open for the latest attempt; false if there is none
    pub fn complete_pairing(&self) -> bool {
        self.emit_latest(LifecycleEvent::Open)
    }

    /// Close the latest session with `reason`, as a remote drop would
    pub fn drop_connection(&self, reason: DisconnectReason) -> bool {
        let state = self.state.lock();
        match state.latest() {
            Some(attempt) => {
                attempt.closed.store(true, Ordering::Release);
                attempt.sink.try_emit(LifecycleEvent::Closed { reason })
            }
            None => false,
        }
    }

    /// Push a raw lifecycle event through the latest attempt's sink
    pub fn emit_latest(&self, event: LifecycleEvent) -> bool {
        let state = self.state.lock();
        state
            .latest()
            .is_some_and(|attempt| attempt.sink.try_emit(event))
    }

    /// Push a lifecycle event through the sink of attempt `number` (1-based)
    pub fn emit_for_attempt(&self, number: usize, event: LifecycleEvent) -> bool {
        let state = self.state.lock();
        number
            .checked_sub(1)
            .and_then(|index| state.attempts.get(index))
            .is_some_and(|attempt| attempt.sink.try_emit(event))
    }

    pub fn connect_count(&self) -> u32 {
        self.state.lock().connect_count
    }

    pub fn purge_count(&self) -> u32 {
        self.state.lock().purge_count
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Digits of every accepted recipient, in send order
    pub fn sent_to(&self) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|m| m.recipient.clone())
            .collect()
    }

    pub fn presences(&self) -> Vec<(String, Presence)> {
        self.state.lock().presences.clone()
    }

    fn next_script(&self) -> ConnectScript {
        let mut state = self.state.lock();
        state.connect_count += 1;
        match state.scripts.pop_front() {
            Some(script) => script,
            None => state.default_script.clone(),
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockConnector")
            .field("connect_count", &state.connect_count)
            .field("purge_count", &state.purge_count)
            .field("sent", &state.sent.len())
            .finish()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, sink: LifecycleSink) -> CourierResult<Arc<dyn Session>> {
        let script = self.next_script();
        debug!(generation = sink.generation(), ?script, "Mock connect");

        if let ConnectScript::Fail { reason } = script {
            return Err(CourierError::construction_failed(reason));
        }

        let closed = Arc::new(AtomicBool::new(false));
        self.state.lock().attempts.push(Attempt {
            sink: sink.clone(),
            closed: closed.clone(),
        });
        let session = Arc::new(MockSession {
            state: self.state.clone(),
            sink: sink.clone(),
            closed: closed.clone(),
        });

        match script {
            ConnectScript::Open => {
                sink.emit(LifecycleEvent::Open).await;
            }
            ConnectScript::PairThenOpen { payload } => {
                sink.emit(LifecycleEvent::PairingChallenge { payload }).await;
                sink.emit(LifecycleEvent::Open).await;
            }
            ConnectScript::PairOnly { payload } => {
                sink.emit(LifecycleEvent::PairingChallenge { payload }).await;
            }
            ConnectScript::CloseWith(reason) => {
                closed.store(true, Ordering::Release);
                sink.emit(LifecycleEvent::Closed { reason }).await;
            }
            ConnectScript::Silent | ConnectScript::Fail { .. } => {}
        }

        Ok(session)
    }

    async fn purge_credentials(&self) -> CourierResult<()> {
        self.state.lock().purge_count += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Mock Session
// ----------------------------------------------------------------------------

struct MockSession {
    state: Arc<Mutex<ConnectorState>>,
    sink: LifecycleSink,
    closed: Arc<AtomicBool>,
}

impl MockSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn send_text(&self, to: &Recipient, body: &str) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::NotConnected);
        }

        let latency = self.state.lock().send_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
            if self.is_closed() {
                return Err(SendError::NotConnected);
            }
        }

        let mut state = self.state.lock();
        if state.failing.contains(to.digits()) {
            return Err(SendError::Rejected {
                reason: format!("recipient {} is not on the network", to.digits()),
            });
        }

        state.sent.push(SentMessage {
            recipient: to.digits().to_string(),
            address: to.address().to_string(),
            body: body.to_string(),
        });

        if let Some((count, reason)) = state.drop_after_sends {
            if state.sent.len() >= count {
                state.drop_after_sends = None;
                self.closed.store(true, Ordering::Release);
                self.sink.try_emit(LifecycleEvent::Closed { reason });
            }
        }
        Ok(())
    }

    async fn send_presence(&self, to: &Recipient, presence: Presence) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::NotConnected);
        }
        self.state
            .lock()
            .presences
            .push((to.digits().to_string(), presence));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
