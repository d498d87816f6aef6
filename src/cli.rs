//! CLI definitions for cronwarden.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cronwarden CLI.
#[derive(Parser)]
#[command(name = "cronwarden")]
#[command(about = "Cron job scheduler with execution history")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config/cronwarden.toml",
        env = "CRONWARDEN_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler and HTTP API in foreground (default)
    Serve {
        /// Server host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Server port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List jobs with their last run status
    Jobs,

    /// Show a job's execution history, newest first
    Executions {
        /// Job ID
        job_id: i64,
    },

    /// Print an execution log
    Log {
        /// Execution ID
        execution_id: i64,

        /// Write to the default log file name instead of stdout
        #[arg(long)]
        save: bool,
    },

    /// Validate a cron expression and show its next fire times
    Check {
        /// Cron expression, quoted
        expression: String,

        /// Number of fire times to show
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::try_parse_from(["cronwarden"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config/cronwarden.toml"));
    }

    #[test]
    fn test_serve_overrides() {
        let cli =
            Cli::try_parse_from(["cronwarden", "serve", "--port", "9090", "-c", "a.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("a.toml"));
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9090));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_check_args() {
        let cli = Cli::try_parse_from(["cronwarden", "check", "*/5 * * * *", "--count", "3"]).unwrap();
        match cli.command {
            Some(Commands::Check { expression, count }) => {
                assert_eq!(expression, "*/5 * * * *");
                assert_eq!(count, 3);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_job_id_must_be_numeric() {
        assert!(Cli::try_parse_from(["cronwarden", "executions", "abc"]).is_err());
    }
}
