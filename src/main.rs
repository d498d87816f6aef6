//! cronwarden - cron job scheduler
//!
//! Main entry point for the cronwarden CLI and server.

mod cli;
mod cmd_inspect;
mod server;

use clap::Parser;

use cronwarden_config::{ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)?;
    let warnings = ConfigValidator::validate(&config).into_result()?;

    match cli.command {
        None => server::run_server(config, warnings, None, None).await,
        Some(Commands::Serve { host, port }) => {
            server::run_server(config, warnings, host, port).await
        }
        Some(Commands::Jobs) => cmd_inspect::list_jobs(&config).await,
        Some(Commands::Executions { job_id }) => {
            cmd_inspect::list_executions(&config, job_id).await
        }
        Some(Commands::Log { execution_id, save }) => {
            cmd_inspect::show_log(&config, execution_id, save).await
        }
        Some(Commands::Check { expression, count }) => {
            cmd_inspect::check_expression(&config, &expression, count)
        }
    }
}
