//! Command-line surface of the `servprobe` binary.

mod report;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::database::DatabaseImpl;
use crate::monitoring::DefaultCheckerFactory;

#[derive(Parser, Debug)]
#[command(name = "servprobe")]
#[command(about = "Probe services on a schedule and alert when their health changes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path (default: ~/.config/servprobe/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `servprobe=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Monitor every configured service until interrupted
    Serve,
    /// Probe every service once and print the results
    Check,
    /// Show the latest stored result and uptime of each service
    Status,
    /// Show stored results for one service, newest first
    History {
        /// Service name
        #[arg(value_name = "SERVICE")]
        service: String,
        /// Rows per page
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Rows to skip
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },
    /// Print the effective configuration
    Config,
    /// Print the version
    Version,
}

/// Run a parsed command line, returning the process exit code
pub async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Version = cli.command {
        println!("servprobe {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::from_config(cli.config.as_deref())?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Serve => serve::serve(config).await?,
        Commands::Check => {
            let factory = DefaultCheckerFactory::new(config.container.socket.clone());
            let results = report::check_once(&config.services, &factory).await;
            report::write_check_table(&mut stdout, &config.services, &results)?;
            if results.iter().any(|result| !result.is_up()) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Status => {
            let database = DatabaseImpl::open(&config.storage.path).await?;
            report::write_status(&mut stdout, &database, &config.services).await?;
        }
        Commands::History { service, limit, offset } => {
            let database = DatabaseImpl::open(&config.storage.path).await?;
            report::write_history(&mut stdout, &database, &service, limit, offset).await?;
        }
        Commands::Config => print!("{config}"),
        Commands::Version => {}
    }

    Ok(ExitCode::SUCCESS)
}
