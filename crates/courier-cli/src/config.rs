//! Courier CLI Configuration
//!
//! One TOML file holds both the engine settings (`[pacing]`, `[cooldown]`,
//! `[quota]`, `[reconnect]`, `[addressing]`, `[channels]`) and the CLI's own
//! `[cli]` table. Every table and field is optional; missing values fall
//! back to the engine defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_core::CourierConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CliError, Result};

/// Complete configuration for the courier CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine configuration
    #[serde(flatten)]
    pub engine: CourierConfig,

    /// CLI-specific settings
    pub cli: CliSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    /// Where session credentials live; `--credentials-dir` wins over this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_dir: Option<PathBuf>,
    /// How long to wait for the session to come online
    pub connect_timeout_secs: u64,
    /// Delay before the simulated device accepts a pairing code
    pub pairing_delay_ms: u64,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            credentials_dir: None,
            connect_timeout_secs: 120,
            pairing_delay_ms: 3_000,
        }
    }
}

impl CliSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pairing_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_delay_ms)
    }
}

impl AppConfig {
    /// Parse and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate().map_err(courier_core::CourierError::from)?;
        if self.cli.connect_timeout_secs == 0 {
            return Err(CliError::Config(
                "cli.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the credentials directory: flag, then file, then the
    /// platform data directory
    pub fn credentials_dir(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(dir) = flag {
            return dir.to_path_buf();
        }
        if let Some(dir) = &self.cli.credentials_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("courier").join("credentials"))
            .unwrap_or_else(|| PathBuf::from(".courier").join("credentials"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [pacing]
            min_delay_ms = 1000
            max_delay_ms = 2000

            [quota]
            daily_message_cap = 25

            [cli]
            credentials_dir = "/var/lib/courier"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.pacing.min_delay_ms, 1_000);
        assert_eq!(config.engine.pacing.max_delay_ms, 2_000);
        assert_eq!(
            config.engine.pacing.session_break_every_n,
            CourierConfig::default().pacing.session_break_every_n
        );
        assert_eq!(config.engine.quota.daily_message_cap, 25);
        assert_eq!(config.engine.cooldown, CourierConfig::default().cooldown);
        assert_eq!(config.cli.connect_timeout_secs, 120);
        assert_eq!(
            config.credentials_dir(None),
            PathBuf::from("/var/lib/courier")
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_contradictory_delays_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [pacing]
            min_delay_ms = 5000
            max_delay_ms = 100
            "#,
        );
        assert!(matches!(result, Err(CliError::Courier(_))));
    }

    #[test]
    fn test_zero_connect_timeout_rejected() {
        let result = AppConfig::from_toml("[cli]\nconnect_timeout_secs = 0\n");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_default_survives_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[pacing]"));
        assert_eq!(AppConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_flag_overrides_file() {
        let mut config = AppConfig::default();
        config.cli.credentials_dir = Some(PathBuf::from("/from/file"));
        assert_eq!(
            config.credentials_dir(Some(Path::new("/from/flag"))),
            PathBuf::from("/from/flag")
        );
    }
}
