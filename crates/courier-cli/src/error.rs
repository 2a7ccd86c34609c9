//! Error handling for the courier CLI

use courier_core::{CourierError, DispatchRejection};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Courier error: {0}")]
    Courier(#[from] CourierError),

    #[error("Dispatch rejected: {0}")]
    Rejected(#[from] DispatchRejection),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No recipients given; use --numbers or --file")]
    NoRecipients,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Session logged out; run `courier reset` to pair again")]
    LoggedOut,

    #[error("Connection unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML writing error: {0}")]
    TomlWriting(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err.to_string())
    }
}
