//! Command Line and Logging
//!
//! Command-line interface and tracing setup for the freight chat client.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Freight marketplace chat command-line interface
#[derive(Parser, Debug)]
#[command(name = "freight-chat")]
#[command(about = "Terminal chat client for the freight marketplace", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long)]
    pub json_logs: bool,

    /// Show timestamps in logs (`--timestamps false` to hide them)
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub timestamps: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bearer token, overrides the configured one
    #[arg(long, env = "FREIGHT_CHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Client commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Join a conversation and chat interactively
    Chat {
        /// Conversation id
        #[arg(short = 'C', long)]
        conversation: i64,
    },

    /// Print the message history of a conversation
    History {
        /// Conversation id
        #[arg(short = 'C', long)]
        conversation: i64,
    },

    /// List conversations of the current user
    Conversations,

    /// Show current configuration
    DumpConfig {
        /// Show the bearer token
        #[arg(long)]
        show_sensitive: bool,
    },
}

/// Initialize logging based on CLI configuration
///
/// Logs go to stderr so they never interleave with the chat view.
pub fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    match (cli.json_logs, cli.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.without_time().json().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }

    info!(
        "Logging initialized: level={}, json={}, timestamps={}",
        log_level, cli.json_logs, cli.timestamps
    );
    Ok(())
}

/// Mask a secret for display
pub fn redact(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(secret) if secret.chars().count() <= 8 => "********".to_string(),
        Some(secret) => format!("{}********", secret.chars().take(4).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_command() {
        let cli = Cli::try_parse_from([
            "freight-chat",
            "--log-level",
            "debug",
            "--token",
            "abc",
            "chat",
            "--conversation",
            "42",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert_eq!(cli.command, Command::Chat { conversation: 42 });
    }

    #[test]
    fn test_parse_dump_config() {
        let cli = Cli::try_parse_from(["freight-chat", "dump-config", "--show-sensitive"]).unwrap();
        assert_eq!(cli.command, Command::DumpConfig { show_sensitive: true });
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_timestamps_can_be_disabled() {
        let cli = Cli::try_parse_from(["freight-chat", "conversations"]).unwrap();
        assert!(cli.timestamps);

        let cli =
            Cli::try_parse_from(["freight-chat", "--timestamps", "false", "conversations"]).unwrap();
        assert!(!cli.timestamps);
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["freight-chat"]).is_err());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact(None), "(not set)");
        assert_eq!(redact(Some("short")), "********");
        assert_eq!(redact(Some("eyJhbGciOiJIUzI1NiJ9")), "eyJh********");
    }
}
