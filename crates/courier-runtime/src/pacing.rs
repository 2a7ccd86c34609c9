//! Human-like pacing between sends

use courier_core::PacingConfig;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Draws inter-message delays and decides when to take long breaks
pub struct Pacer {
    config: PacingConfig,
    rng: Mutex<StdRng>,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic delays for tests and reproducible runs
    pub fn with_seed(config: PacingConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform jitter in `[min_delay_ms, max_delay_ms]`
    pub fn inter_message_delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        let millis = if min == max {
            min
        } else {
            self.rng.lock().gen_range(min..=max)
        };
        Duration::from_millis(millis)
    }

    /// Whether a long break is due after `sent` successful sends in a job
    pub fn break_due(&self, sent: usize) -> bool {
        self.config.breaks_enabled()
            && sent > 0
            && sent % self.config.session_break_every_n as usize == 0
    }

    pub fn session_break(&self) -> Duration {
        self.config.session_break_duration()
    }

    /// Simulated typing time for `body`, or `None` when typing is disabled
    pub fn typing_delay(&self, body: &str) -> Option<Duration> {
        if !self.config.simulate_typing {
            return None;
        }
        let chars = body.chars().count() as u64;
        let millis = chars
            .saturating_mul(self.config.typing_ms_per_char)
            .min(self.config.max_typing_delay_ms);
        Some(Duration::from_millis(millis))
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> PacingConfig {
        PacingConfig {
            min_delay_ms: 3_000,
            max_delay_ms: 8_000,
            session_break_every_n: 4,
            session_break_duration_ms: 60_000,
            simulate_typing: true,
            typing_ms_per_char: 40,
            max_typing_delay_ms: 2_000,
        }
    }

    #[test]
    fn test_delay_within_bounds_and_varied() {
        let pacer = Pacer::with_seed(create_test_config(), 42);
        let delays: Vec<_> = (0..200).map(|_| pacer.inter_message_delay()).collect();

        assert!(delays
            .iter()
            .all(|d| *d >= Duration::from_millis(3_000) && *d <= Duration::from_millis(8_000)));
        let first = delays[0];
        assert!(delays.iter().any(|d| *d != first));
    }

    #[test]
    fn test_fixed_delay_when_bounds_equal() {
        let pacer = Pacer::new(PacingConfig {
            min_delay_ms: 500,
            max_delay_ms: 500,
            ..create_test_config()
        });
        assert_eq!(pacer.inter_message_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_break_cadence() {
        let pacer = Pacer::new(create_test_config());
        let due: Vec<_> = (0..=12).filter(|n| pacer.break_due(*n)).collect();
        assert_eq!(due, vec![4, 8, 12]);

        let disabled = Pacer::new(PacingConfig {
            session_break_every_n: 0,
            ..create_test_config()
        });
        assert!(!(0..20).any(|n| disabled.break_due(n)));
    }

    #[test]
    fn test_typing_delay_scales_and_caps() {
        let pacer = Pacer::new(create_test_config());
        assert_eq!(pacer.typing_delay("hello"), Some(Duration::from_millis(200)));
        assert_eq!(
            pacer.typing_delay(&"x".repeat(500)),
            Some(Duration::from_millis(2_000))
        );

        let silent = Pacer::new(PacingConfig {
            simulate_typing: false,
            ..create_test_config()
        });
        assert_eq!(silent.typing_delay("hello"), None);
    }
}
