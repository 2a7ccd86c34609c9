//! Courier CLI
//!
//! Command-line front end for the courier engine: pairs a session, sends
//! one message to a recipient list under the configured pacing, cooldown
//! and quota policies, and reports progress as text or JSON lines.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;

pub use app::CourierApp;
pub use cli::{Cli, Commands, QrFormat};
pub use commands::{collect_recipients, CommandDispatcher};
pub use config::{AppConfig, CliSettings};
pub use error::{CliError, Result};
pub use render::QrRenderer;
