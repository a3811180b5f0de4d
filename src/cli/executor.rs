//! Command executor for dispatching CLI commands
//!
//! This module provides the main entry point for executing CLI commands
//! after parsing and configuration loading.

use super::handlers::{
    AdminCommandHandler, HistoryCommandHandler, MigrateCommandHandler, RunCommandHandler,
    ServeCommandHandler, SyncCommandHandler,
};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Execute a CLI command with the given settings
///
/// Without a subcommand the scheduler is served, as with `cadence serve`.
///
/// # Errors
/// Returns errors from command handlers or validation failures
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    cli.validate()
        .map_err(|reason| AppError::validation("cli_arguments", reason))?;

    let command = match &cli.command {
        None => return ServeCommandHandler::new(settings).execute(false).await,
        Some(Commands::Serve { dry_run, .. }) => {
            return ServeCommandHandler::new(settings).execute(*dry_run).await;
        }
        Some(Commands::Migrate { dry_run, rollback }) => {
            return MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await;
        }
        Some(command) => command,
    };

    if settings.database.is_memory() && mutates_definitions(command) {
        tracing::warn!(
            "database.url is \"memory\": changes are discarded when this command exits"
        );
    }

    let state = AppState::initialize(settings).await?;
    match command {
        Commands::Run { job_id, json } => {
            RunCommandHandler::new(state).execute(*job_id, *json).await
        }
        Commands::Sync { job_id } => SyncCommandHandler::new(state).execute(*job_id).await,
        Commands::History {
            job_id,
            limit,
            run,
            json,
        } => {
            HistoryCommandHandler::new(state)
                .execute(*job_id, *limit, *run, *json)
                .await
        }
        Commands::Job(command) => AdminCommandHandler::new(state).job(command).await,
        Commands::Schedule(command) => AdminCommandHandler::new(state).schedule(command).await,
        Commands::Action(command) => AdminCommandHandler::new(state).action(command).await,
        Commands::Param(command) => AdminCommandHandler::new(state).param(command).await,
        Commands::ListCommands => {
            AdminCommandHandler::new(state).list_commands();
            Ok(())
        }
        Commands::Serve { .. } | Commands::Migrate { .. } => Ok(()),
    }
}

fn mutates_definitions(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Job(_) | Commands::Schedule(_) | Commands::Action(_) | Commands::Param(_)
    )
}
