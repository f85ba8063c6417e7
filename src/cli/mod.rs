//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for MedBridge using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// MedBridge - clinical event synchronization to a national FHIR registry
#[derive(Parser, Debug)]
#[command(name = "medbridge")]
#[command(version, about, long_about = None)]
#[command(author = "MedBridge Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "medbridge.toml", env = "MEDBRIDGE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "MEDBRIDGE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API
    Serve(commands::serve::ServeArgs),

    /// Consume NDJSON inbound events from a file or stdin
    Ingest(commands::ingest::IngestArgs),

    /// Run a reconciliation sweep
    Sweep(commands::sweep::SweepArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show outstanding sync work
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Whether the command writes log files configured in `[logging]`
    pub fn is_long_running(&self) -> bool {
        matches!(self, Commands::Serve(_) | Commands::Ingest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::SweepKind;

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from(["medbridge", "serve"]);
        assert_eq!(cli.config, "medbridge.toml");
        assert!(matches!(cli.command, Commands::Serve(_)));
        assert!(cli.command.is_long_running());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["medbridge", "--config", "custom.toml", "status"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["medbridge", "--log-level", "debug", "status"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_sweep_default_and_explicit() {
        let cli = Cli::parse_from(["medbridge", "sweep"]);
        match cli.command {
            Commands::Sweep(args) => assert_eq!(args.sweep, SweepKind::All),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["medbridge", "sweep", "duplicates", "--dry-run"]);
        match cli.command {
            Commands::Sweep(args) => {
                assert_eq!(args.sweep, SweepKind::Duplicates);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_ingest_file() {
        let cli = Cli::parse_from(["medbridge", "ingest", "--file", "events.ndjson"]);
        match cli.command {
            Commands::Ingest(args) => assert_eq!(args.file, "events.ndjson"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_sweep() {
        assert!(Cli::try_parse_from(["medbridge", "sweep", "everything"]).is_err());
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["medbridge", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["medbridge", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
