//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the session credentials
    #[arg(long, global = true)]
    pub credentials_dir: Option<PathBuf>,

    /// Print events as JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// How pairing codes are shown
    #[arg(long, value_enum, global = true, default_value_t = QrFormat::Terminal)]
    pub qr: QrFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect (pairing if needed) and send one message to a list of recipients
    Send {
        /// Comma, semicolon or newline separated phone numbers
        #[arg(short, long)]
        numbers: Option<String>,
        /// File with one or more numbers per line
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Message body
        #[arg(short, long)]
        message: String,
    },
    /// Show the configured safety limits and current usage
    Safety,
    /// Purge stored credentials and pair again
    Reset,
    /// Connect and stream events until interrupted
    Watch,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum QrFormat {
    /// Block characters for the terminal
    Terminal,
    /// SVG document
    Svg,
    /// The raw pairing payload
    Raw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "courier",
            "-v",
            "send",
            "--numbers",
            "9876543210, 9876543211",
            "--message",
            "hello",
            "--credentials-dir",
            "/tmp/creds",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.credentials_dir, Some(PathBuf::from("/tmp/creds")));
        assert_eq!(cli.qr, QrFormat::Terminal);
        match cli.command {
            Commands::Send {
                numbers, message, ..
            } => {
                assert_eq!(numbers.as_deref(), Some("9876543210, 9876543211"));
                assert_eq!(message, "hello");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_send_requires_message() {
        assert!(Cli::try_parse_from(["courier", "send", "--numbers", "1"]).is_err());
    }

    #[test]
    fn test_parse_qr_format() {
        let cli = Cli::try_parse_from(["courier", "reset", "--qr", "svg"]).unwrap();
        assert_eq!(cli.qr, QrFormat::Svg);
        assert!(matches!(cli.command, Commands::Reset));
    }
}
