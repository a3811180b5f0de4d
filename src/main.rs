use std::process::ExitCode;

use clap::Parser;

use cadence::cli::{Cli, execute_command, init_logger_from_settings, load_and_merge_config};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_and_merge_config(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logger_from_settings(&settings) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    tracing::debug!(version = cadence::pkg_version(), "Starting cadence");

    match execute_command(&cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            ExitCode::FAILURE
        }
    }
}
