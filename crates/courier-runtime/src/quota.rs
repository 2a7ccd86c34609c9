//! Daily send quota
//!
//! A single (count, day) pair guarded by a mutex. The day marker is the
//! caller-local calendar date, so the counter resets on the first access
//! after midnight rather than 24 hours after the previous reset.

use courier_core::{CalendarDay, TimeSource};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct DailyCounter {
    count: u32,
    day: CalendarDay,
}

/// Global ceiling on successful sends per calendar day
pub struct DailyQuotaTracker {
    cap: u32,
    counter: Mutex<DailyCounter>,
    time_source: Arc<dyn TimeSource>,
}

impl DailyQuotaTracker {
    pub fn new(cap: u32, time_source: Arc<dyn TimeSource>) -> Self {
        let day = time_source.today();
        Self {
            cap,
            counter: Mutex::new(DailyCounter { count: 0, day }),
            time_source,
        }
    }

    fn reconcile(&self, counter: &mut DailyCounter) {
        let today = self.time_source.today();
        if counter.day != today {
            tracing::info!(
                previous_day = %counter.day,
                day = %today,
                sent = counter.count,
                "Daily quota rolled over"
            );
            counter.count = 0;
            counter.day = today;
        }
    }

    /// Claim one slot for today. Returns false when the cap is reached.
    pub fn try_consume(&self) -> bool {
        let mut counter = self.counter.lock();
        self.reconcile(&mut counter);
        if counter.count >= self.cap {
            return false;
        }
        counter.count += 1;
        true
    }

    /// Slots left today
    pub fn remaining(&self) -> u32 {
        let mut counter = self.counter.lock();
        self.reconcile(&mut counter);
        self.cap.saturating_sub(counter.count)
    }

    /// Slots consumed today
    pub fn sent_today(&self) -> u32 {
        let mut counter = self.counter.lock();
        self.reconcile(&mut counter);
        counter.count
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }
}

impl std::fmt::Debug for DailyQuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyQuotaTracker")
            .field("cap", &self.cap)
            .field("counter", &*self.counter.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_harness::MockTimeSource;
    use std::time::Duration;

    // 2024-03-01T10:00:00Z
    const MORNING: u64 = 1_709_287_200_000;

    #[test]
    fn test_never_exceeds_cap() {
        let time = Arc::new(MockTimeSource::new(MORNING));
        let quota = DailyQuotaTracker::new(3, time);

        assert!(quota.try_consume());
        assert!(quota.try_consume());
        assert!(quota.try_consume());
        assert!(!quota.try_consume());
        assert!(!quota.try_consume());
        assert_eq!(quota.sent_today(), 3);
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_resets_on_calendar_day_change() {
        let time = Arc::new(MockTimeSource::new(MORNING));
        let quota = DailyQuotaTracker::new(2, time.clone());
        assert!(quota.try_consume());
        assert!(quota.try_consume());
        assert!(!quota.try_consume());

        // 13h59m later is still 2024-03-01
        time.advance(Duration::from_millis(13 * 3_600_000 + 59 * 60_000));
        assert_eq!(quota.remaining(), 0);

        // Crossing midnight resets regardless of how long ago the first send was
        time.advance(Duration::from_millis(60_000));
        assert_eq!(quota.remaining(), 2);
        assert!(quota.try_consume());
        assert_eq!(quota.sent_today(), 1);
    }

    #[test]
    fn test_zero_cap_grants_nothing() {
        let time = Arc::new(MockTimeSource::new(MORNING));
        let quota = DailyQuotaTracker::new(0, time);
        assert!(!quota.try_consume());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_concurrent_consumers_respect_cap() {
        let time = Arc::new(MockTimeSource::new(MORNING));
        let quota = Arc::new(DailyQuotaTracker::new(50, time));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let quota = quota.clone();
                std::thread::spawn(move || (0..20).filter(|_| quota.try_consume()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 50);
        assert_eq!(quota.sent_today(), 50);
    }
}
