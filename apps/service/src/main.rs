use std::process::ExitCode;

use clap::Parser;
use servprobe::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_tracing(cli.log_level.as_deref());

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
