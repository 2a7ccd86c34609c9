//! Centralized Configuration Management
//!
//! All tunables of the dispatch engine live here. Every struct derives
//! serde with `#[serde(default)]` so that partial configuration files only
//! need to name the values they override.

use crate::errors::ConfigError;
use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Pacing Configuration
// ----------------------------------------------------------------------------

/// Inter-message pacing and human-like typing simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Lower bound of the randomized delay between sends
    pub min_delay_ms: u64,
    /// Upper bound of the randomized delay between sends
    pub max_delay_ms: u64,
    /// Insert a long break after this many successful sends (0 disables)
    pub session_break_every_n: u32,
    /// Length of the long break
    pub session_break_duration_ms: u64,
    /// Send a composing presence and wait before each message
    pub simulate_typing: bool,
    /// Typing delay per character of message body
    pub typing_ms_per_char: u64,
    /// Upper bound on the typing delay
    pub max_typing_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 8_000,
            max_delay_ms: 15_000,
            session_break_every_n: 10,
            session_break_duration_ms: 120_000,
            simulate_typing: true,
            typing_ms_per_char: 50,
            max_typing_delay_ms: 5_000,
        }
    }
}

impl PacingConfig {
    /// Millisecond-scale pacing for tests
    pub fn testing() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 20,
            session_break_every_n: 0,
            session_break_duration_ms: 0,
            simulate_typing: false,
            typing_ms_per_char: 1,
            max_typing_delay_ms: 10,
        }
    }

    /// Slower cadence with frequent breaks
    pub fn conservative() -> Self {
        Self {
            min_delay_ms: 20_000,
            max_delay_ms: 45_000,
            session_break_every_n: 5,
            session_break_duration_ms: 300_000,
            simulate_typing: true,
            typing_ms_per_char: 80,
            max_typing_delay_ms: 8_000,
        }
    }

    /// Whether long breaks are enabled at all
    pub fn breaks_enabled(&self) -> bool {
        self.session_break_every_n > 0 && self.session_break_duration_ms > 0
    }

    pub fn session_break_duration(&self) -> Duration {
        Duration::from_millis(self.session_break_duration_ms)
    }
}

// ----------------------------------------------------------------------------
// Cooldown Configuration
// ----------------------------------------------------------------------------

/// Per-recipient resend floor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Minimum time between two successful sends to the same recipient
    pub window_ms: u64,
    /// Background prune interval (0 disables the background task)
    pub prune_interval_ms: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            window_ms: 24 * 60 * 60 * 1000,
            prune_interval_ms: 60 * 60 * 1000,
        }
    }
}

impl CooldownConfig {
    pub fn testing() -> Self {
        Self {
            window_ms: 1_000,
            prune_interval_ms: 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Quota Configuration
// ----------------------------------------------------------------------------

/// Global daily send ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub daily_message_cap: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_message_cap: 200,
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Bounded exponential backoff for session recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts allowed before the supervisor gives up
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound on any single retry delay
    pub cap_delay_ms: u64,
    /// Fixed delay after a session construction fault
    pub init_retry_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            cap_delay_ms: 60_000,
            init_retry_delay_ms: 5_000,
        }
    }
}

impl ReconnectConfig {
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            cap_delay_ms: 10_000,
            init_retry_delay_ms: 500,
        }
    }
}

// ----------------------------------------------------------------------------
// Addressing Configuration
// ----------------------------------------------------------------------------

/// Rules for turning raw numbers into protocol addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    /// Prefix applied to bare domestic numbers
    pub default_country_code: String,
    /// Digit count identifying a bare domestic number
    pub domestic_number_length: usize,
    /// Suffix appended to produce the protocol address
    pub address_suffix: String,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            default_country_code: "91".to_string(),
            domestic_number_length: 10,
            address_suffix: "@s.whatsapp.net".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the internal channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (caller → supervisor)
    pub command_buffer_size: usize,
    /// Buffer size for lifecycle notifications (session → supervisor)
    pub lifecycle_buffer_size: usize,
    /// Capacity of the AppEvent broadcast bus (engine → observers)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            lifecycle_buffer_size: 64,
            app_event_buffer_size: 256,
        }
    }
}

impl ChannelConfig {
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 16,
            lifecycle_buffer_size: 16,
            app_event_buffer_size: 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration struct that consolidates all courier configurations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub pacing: PacingConfig,
    pub cooldown: CooldownConfig,
    pub quota: QuotaConfig,
    pub reconnect: ReconnectConfig,
    pub addressing: AddressingConfig,
    pub channels: ChannelConfig,
}

impl CourierConfig {
    /// Create new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            pacing: PacingConfig::testing(),
            cooldown: CooldownConfig::testing(),
            quota: QuotaConfig {
                daily_message_cap: 50,
            },
            reconnect: ReconnectConfig::testing(),
            addressing: AddressingConfig::default(),
            channels: ChannelConfig::testing(),
        }
    }

    /// Slower pacing and a lower daily ceiling for fresh accounts
    pub fn conservative() -> Self {
        Self {
            pacing: PacingConfig::conservative(),
            cooldown: CooldownConfig {
                window_ms: 48 * 60 * 60 * 1000,
                ..CooldownConfig::default()
            },
            quota: QuotaConfig {
                daily_message_cap: 50,
            },
            reconnect: ReconnectConfig::default(),
            addressing: AddressingConfig::default(),
            channels: ChannelConfig::default(),
        }
    }

    /// Builder method for customizing pacing configuration
    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Builder method for customizing quota configuration
    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Builder method for customizing cooldown configuration
    pub fn with_cooldown(mut self, cooldown: CooldownConfig) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Builder method for customizing reconnect configuration
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(ConfigError::invalid(
                "pacing.min_delay_ms",
                "cannot exceed pacing.max_delay_ms",
            ));
        }
        if self.reconnect.base_delay_ms > self.reconnect.cap_delay_ms {
            return Err(ConfigError::invalid(
                "reconnect.base_delay_ms",
                "cannot exceed reconnect.cap_delay_ms",
            ));
        }
        if self.addressing.default_country_code.is_empty()
            || !self
                .addressing
                .default_country_code
                .chars()
                .all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::invalid(
                "addressing.default_country_code",
                "must be a non-empty digit string",
            ));
        }
        if self.channels.command_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "channels.command_buffer_size",
                "cannot be zero",
            ));
        }
        if self.channels.lifecycle_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "channels.lifecycle_buffer_size",
                "cannot be zero",
            ));
        }
        if self.channels.app_event_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "channels.app_event_buffer_size",
                "cannot be zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(CourierConfig::default().validate().is_ok());
        assert!(CourierConfig::testing().validate().is_ok());
        assert!(CourierConfig::conservative().validate().is_ok());
    }

    #[test]
    fn test_inverted_pacing_bounds_rejected() {
        let config = CourierConfig::default().with_pacing(PacingConfig {
            min_delay_ms: 10_000,
            max_delay_ms: 5_000,
            ..PacingConfig::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pacing.min_delay_ms"));
    }

    #[test]
    fn test_inverted_backoff_bounds_rejected() {
        let config = CourierConfig::default().with_reconnect(ReconnectConfig {
            base_delay_ms: 100_000,
            cap_delay_ms: 1_000,
            ..ReconnectConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_break_cadence_disables_breaks() {
        let pacing = PacingConfig {
            session_break_every_n: 0,
            session_break_duration_ms: 60_000,
            ..PacingConfig::default()
        };
        assert!(!pacing.breaks_enabled());
        assert!(CourierConfig::default()
            .with_pacing(pacing)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: CourierConfig =
            serde_json::from_str(r#"{ "quota": { "daily_message_cap": 7 } }"#).unwrap();
        assert_eq!(config.quota.daily_message_cap, 7);
        assert_eq!(config.pacing, PacingConfig::default());
        assert_eq!(config.addressing.address_suffix, "@s.whatsapp.net");
    }
}
