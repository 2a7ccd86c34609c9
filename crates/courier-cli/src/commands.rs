//! Command handlers for the courier CLI

use std::path::Path;

use courier_core::{parse_recipient_list, AppEvent};
use courier_runtime::DispatchJob;
use tracing::{info, warn};

use crate::app::CourierApp;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let credentials_dir = config.credentials_dir(cli.credentials_dir.as_deref());
        let qr = cli.qr;
        let json = cli.json;

        match cli.command {
            Commands::Config => Self::handle_config_command(&config),
            Commands::Send {
                numbers,
                file,
                message,
            } => {
                let recipients = collect_recipients(numbers.as_deref(), file.as_deref())?;
                let app = CourierApp::new(&config, credentials_dir, qr, json).await?;
                Self::handle_send_command(app, recipients, message).await
            }
            Commands::Safety => {
                let app = CourierApp::new(&config, credentials_dir, qr, json).await?;
                Self::handle_safety_command(app).await
            }
            Commands::Reset => {
                let app = CourierApp::new(&config, credentials_dir, qr, json).await?;
                Self::handle_reset_command(app).await
            }
            Commands::Watch => {
                let app = CourierApp::new(&config, credentials_dir, qr, json).await?;
                Self::handle_watch_command(app).await
            }
        }
    }

    /// Connect, dispatch one job and report every item until its summary
    async fn handle_send_command(
        mut app: CourierApp,
        recipients: Vec<String>,
        message: String,
    ) -> Result<()> {
        let interrupted = tokio::select! {
            result = app.connect() => {
                result?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            warn!("Interrupted before the session came online");
            return app.shutdown().await;
        }

        let job = DispatchJob::new(recipients, message);
        let total = job.len();
        let ticket = app.runtime().submit_job(job)?;
        let job_id = ticket.job_id();
        info!("Dispatching job {} to {} recipients", job_id, total);

        loop {
            let event = tokio::select! {
                event = app.next_event() => Some(event?),
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(event) = event else {
                warn!("Interrupted; stopping dispatch");
                break;
            };
            app.report(&event)?;
            if matches!(&event, AppEvent::BatchSummary { job_id: id, .. } if *id == job_id) {
                break;
            }
        }

        app.shutdown().await
    }

    /// Print limits and current usage without connecting
    async fn handle_safety_command(app: CourierApp) -> Result<()> {
        let info = app.runtime().query_safety_info();
        println!("{}", serde_json::to_string_pretty(&info)?);
        app.shutdown().await
    }

    /// Purge credentials and pair again
    async fn handle_reset_command(mut app: CourierApp) -> Result<()> {
        info!("Resetting session");
        app.reset().await?;
        println!(
            "Paired; credentials stored in {}",
            app.credentials_dir().display()
        );
        app.shutdown().await
    }

    /// Stay connected and print events until Ctrl+C
    async fn handle_watch_command(mut app: CourierApp) -> Result<()> {
        let interrupted = tokio::select! {
            result = app.connect() => {
                result?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };

        if !interrupted {
            info!("Watching session events (Ctrl+C to stop)");
            loop {
                let event = tokio::select! {
                    event = app.next_event() => Some(event?),
                    _ = tokio::signal::ctrl_c() => None,
                };
                match event {
                    Some(event) => app.report(&event)?,
                    None => break,
                }
            }
        }

        app.shutdown().await
    }

    fn handle_config_command(config: &AppConfig) -> Result<()> {
        print!("{}", config.to_toml()?);
        Ok(())
    }
}

/// Gather recipients from `--numbers` and `--file`, in that order
pub fn collect_recipients(numbers: Option<&str>, file: Option<&Path>) -> Result<Vec<String>> {
    let mut recipients = Vec::new();
    if let Some(numbers) = numbers {
        recipients.extend(parse_recipient_list(numbers));
    }
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)?;
        recipients.extend(parse_recipient_list(&contents));
    }
    if recipients.is_empty() {
        return Err(CliError::NoRecipients);
    }
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_collect_from_flag_and_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "9876543212\n\n9876543213; 9876543214").unwrap();

        let recipients =
            collect_recipients(Some("9876543210,9876543211"), Some(file.path())).unwrap();
        assert_eq!(
            recipients,
            vec![
                "9876543210",
                "9876543211",
                "9876543212",
                "9876543213",
                "9876543214"
            ]
        );
    }

    #[test]
    fn test_collect_requires_recipients() {
        assert!(matches!(
            collect_recipients(Some(" , ;"), None),
            Err(CliError::NoRecipients)
        ));
        assert!(matches!(
            collect_recipients(None, None),
            Err(CliError::NoRecipients)
        ));
    }

    #[test]
    fn test_collect_missing_file() {
        let result = collect_recipients(None, Some(Path::new("/nonexistent/recipients.txt")));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
