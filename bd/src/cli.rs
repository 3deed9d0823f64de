//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// batchdispatch - size-capped batch dispatcher for rate-limited APIs
#[derive(Parser)]
#[command(
    name = "bd",
    about = "Coalesce job requests into size-capped batches for a pool of workers",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/batchdispatch/logs/bd.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Drive the coordinator with simulated workers and report the outcome
    Run {
        /// Number of create requests to submit
        #[arg(long, default_value = "20")]
        creates: usize,

        /// Number of poll requests to submit
        #[arg(long, default_value = "40")]
        polls: usize,

        /// Number of distinct owners the requests are spread across
        #[arg(long, default_value = "3")]
        owners: usize,

        /// Declared size in bytes of each create request (default: the
        /// serialized payload length)
        #[arg(long)]
        create_bytes: Option<u64>,

        /// Cancel this owner's pending creates right after submission
        #[arg(long, value_name = "OWNER")]
        cancel: Option<String>,

        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(short, long, default_value = "yaml")]
        format: OutputFormat,
    },
}

/// Output format for run summaries and config
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(format!("Unknown format: {}. Use: text, json, or yaml", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["bd"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::parse_from(["bd", "run"]);
        if let Some(Command::Run {
            creates,
            polls,
            owners,
            create_bytes,
            cancel,
            workers,
            format,
        }) = cli.command
        {
            assert_eq!(creates, 20);
            assert_eq!(polls, 40);
            assert_eq!(owners, 3);
            assert!(create_bytes.is_none());
            assert!(cancel.is_none());
            assert!(workers.is_none());
            assert!(matches!(format, OutputFormat::Text));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_run_with_cancel() {
        let cli = Cli::parse_from(["bd", "run", "--creates", "5", "--cancel", "owner-1", "-w", "2"]);
        if let Some(Command::Run {
            creates, cancel, workers, ..
        }) = cli.command
        {
            assert_eq!(creates, 5);
            assert_eq!(cancel.as_deref(), Some("owner-1"));
            assert_eq!(workers, Some(2));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_config() {
        let cli = Cli::parse_from(["bd", "config"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                format: OutputFormat::Yaml
            })
        ));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!(matches!("yml".parse::<OutputFormat>(), Ok(OutputFormat::Yaml)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["bd", "-c", "/path/to/config.yml", "config"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
