//! Manually advanced clock

use courier_core::{TimeSource, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Mock time source for testing
///
/// Reports a UTC calendar day derived from the current millis, so tests can
/// cross midnight by advancing the clock.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    current_time: AtomicU64,
}

impl MockTimeSource {
    pub fn new(initial_time: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.current_time
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_time(&self, time: u64) {
        self.current_time.store(time, Ordering::SeqCst);
    }

    pub fn current_time(&self) -> u64 {
        self.current_time.load(Ordering::SeqCst)
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_crosses_day_boundary() {
        // 2024-03-01T23:00:00Z
        let time = MockTimeSource::new(1_709_334_000_000);
        assert_eq!(time.today().as_str(), "2024-03-01");

        time.advance(Duration::from_secs(2 * 3_600));
        assert_eq!(time.today().as_str(), "2024-03-02");
        assert_eq!(time.now().as_millis(), 1_709_341_200_000);
    }
}
