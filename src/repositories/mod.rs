//! Repository layer for job definitions and run history.
//!
//! The scheduling core talks to persistence only through [`JobStore`]. Every
//! call is an independent short-lived scope: one pooled connection for
//! PostgreSQL, one lock acquisition for the in-memory store.

mod memory;
mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::config::DatabaseConfig;
use crate::db::{establish_async_connection_pool, migrate};
use crate::error::AppResult;
use crate::models::{
    Action, ActionParameter, ActionRun, Job, JobDefinition, JobRun, LogMessage, NewAction,
    NewActionParameter, NewActionRun, NewJob, NewJobRun, NewLogMessage, NewSchedule, Schedule,
    UpdateAction, UpdateActionParameter, UpdateJob, UpdateSchedule,
};

/// Persistence contract for job definitions and their audit trail.
///
/// `get_*` returns `Ok(None)` for a missing id; `update_*` and `delete_*`
/// return `AppError::NotFound`. Deleting a job cascades to its schedules,
/// actions and parameters but never to its runs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: NewJob) -> AppResult<Job>;
    async fn get_job(&self, id: i32) -> AppResult<Option<Job>>;
    async fn list_jobs(&self) -> AppResult<Vec<Job>>;
    async fn update_job(&self, id: i32, update: UpdateJob) -> AppResult<Job>;
    async fn delete_job(&self, id: i32) -> AppResult<()>;

    async fn create_schedule(&self, schedule: NewSchedule) -> AppResult<Schedule>;
    async fn get_schedule(&self, id: i32) -> AppResult<Option<Schedule>>;
    async fn schedules_for_job(&self, job_id: i32) -> AppResult<Vec<Schedule>>;
    async fn update_schedule(&self, id: i32, update: UpdateSchedule) -> AppResult<Schedule>;
    /// Returns the deleted row so callers know which job to resynchronize.
    async fn delete_schedule(&self, id: i32) -> AppResult<Schedule>;

    async fn create_action(&self, action: NewAction) -> AppResult<Action>;
    async fn get_action(&self, id: i32) -> AppResult<Option<Action>>;
    /// Ordered by position, then id.
    async fn actions_for_job(&self, job_id: i32) -> AppResult<Vec<Action>>;
    async fn update_action(&self, id: i32, update: UpdateAction) -> AppResult<Action>;
    async fn delete_action(&self, id: i32) -> AppResult<Action>;

    async fn create_parameter(&self, parameter: NewActionParameter) -> AppResult<ActionParameter>;
    async fn get_parameter(&self, id: i32) -> AppResult<Option<ActionParameter>>;
    async fn parameters_for_action(&self, action_id: i32) -> AppResult<Vec<ActionParameter>>;
    async fn update_parameter(
        &self,
        id: i32,
        update: UpdateActionParameter,
    ) -> AppResult<ActionParameter>;
    async fn delete_parameter(&self, id: i32) -> AppResult<ActionParameter>;

    async fn create_job_run(&self, run: NewJobRun) -> AppResult<JobRun>;
    async fn finish_job_run(&self, id: i64, ended_at: NaiveDateTime, error: bool)
    -> AppResult<JobRun>;
    async fn get_job_run(&self, id: i64) -> AppResult<Option<JobRun>>;
    /// Newest first.
    async fn job_runs(&self, job_id: i32, limit: i64, offset: i64) -> AppResult<Vec<JobRun>>;

    async fn create_action_run(&self, run: NewActionRun) -> AppResult<ActionRun>;
    async fn finish_action_run(&self, id: i64, ended_at: NaiveDateTime) -> AppResult<ActionRun>;
    /// Ordered by ordinal.
    async fn action_runs(&self, job_run_id: i64) -> AppResult<Vec<ActionRun>>;

    async fn append_log_message(&self, message: NewLogMessage) -> AppResult<LogMessage>;
    /// Ordered by sequence.
    async fn log_messages(&self, action_run_id: i64) -> AppResult<Vec<LogMessage>>;

    /// Deletes finished runs that ended before `before`, cascading to their
    /// action runs and log messages. Runs still in progress are kept.
    async fn purge_job_runs(&self, before: NaiveDateTime) -> AppResult<usize>;

    /// Loads a job with its schedules and its ordered actions and parameters.
    async fn load_job_definition(&self, job_id: i32) -> AppResult<Option<JobDefinition>> {
        let Some(job) = self.get_job(job_id).await? else {
            return Ok(None);
        };

        let schedules = self.schedules_for_job(job_id).await?;
        let mut actions = Vec::new();
        for action in self.actions_for_job(job_id).await? {
            let parameters = self.parameters_for_action(action.id).await?;
            actions.push((action, parameters));
        }

        Ok(Some(JobDefinition {
            job,
            schedules,
            actions,
        }))
    }
}

/// Opens the store selected by `database.url`, running pending migrations
/// first when `database.auto_migrate` is set.
pub async fn open_store(config: &DatabaseConfig) -> AppResult<Arc<dyn JobStore>> {
    if config.is_memory() {
        tracing::info!("Using in-memory job store");
        return Ok(Arc::new(MemoryJobStore::new()));
    }

    if config.auto_migrate {
        let applied = migrate::run_pending_migrations(&config.url).await?;
        tracing::info!(applied = applied.len(), "Database migrations checked");
    }

    let pool = establish_async_connection_pool(config).await?;
    tracing::info!(max_connections = config.max_connections, "Using PostgreSQL job store");
    Ok(Arc::new(PgJobStore::new(pool)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store_memory() {
        let store = open_store(&DatabaseConfig::default()).await.unwrap();
        assert!(store.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_job_definition_orders_actions() {
        let store = MemoryJobStore::new();
        let job = store
            .create_job(NewJob {
                name: "nightly".to_string(),
                group_name: "ops".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        for (command, position) in [("second", 2), ("first", 1), ("also-second", 2)] {
            store
                .create_action(NewAction {
                    job_id: job.id,
                    command_name: command.to_string(),
                    position,
                    enabled: true,
                    description: None,
                })
                .await
                .unwrap();
        }

        let definition = store.load_job_definition(job.id).await.unwrap().unwrap();
        let order: Vec<_> = definition
            .actions
            .iter()
            .map(|(a, _)| a.command_name.as_str())
            .collect();
        assert_eq!(order, ["first", "second", "also-second"]);
        assert!(store.load_job_definition(job.id + 1).await.unwrap().is_none());
    }
}
