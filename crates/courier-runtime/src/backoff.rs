//! Reconnect bookkeeping for the connection supervisor

use courier_core::ReconnectConfig;
use std::time::Duration;

/// Attempt counter plus bounded exponential backoff
///
/// Every retry the supervisor schedules goes through one of the `next_*`
/// methods, each of which consumes an attempt. Once the attempt count
/// exceeds the ceiling they return `None` and the supervisor gives up.
#[derive(Debug, Clone)]
pub struct ReconnectContext {
    attempts: u32,
    max_attempts: u32,
    base_delay_ms: u64,
    cap_delay_ms: u64,
}

impl ReconnectContext {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            cap_delay_ms: config.cap_delay_ms,
        }
    }

    fn register_attempt(&mut self) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts <= self.max_attempts
    }

    /// Backoff delay for the current attempt: `min(base * 2^(attempt-1), cap)`
    pub fn current_delay(&self) -> Duration {
        let exponent = self.attempts.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.cap_delay_ms);
        Duration::from_millis(delay)
    }

    /// Consume an attempt and return its exponential backoff delay
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.register_attempt() {
            Some(self.current_delay())
        } else {
            None
        }
    }

    /// Consume an attempt that should run without waiting
    pub fn next_immediate(&mut self) -> Option<Duration> {
        self.register_attempt().then_some(Duration::ZERO)
    }

    /// Consume an attempt that waits a fixed delay
    pub fn next_fixed(&mut self, delay: Duration) -> Option<Duration> {
        self.register_attempt().then_some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.max_attempts
    }
}
