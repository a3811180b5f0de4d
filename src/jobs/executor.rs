use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::AppResult;
use crate::jobs::guard::{ExecutionGuard, ExecutionToken};
use crate::jobs::runner::{ActionRunner, PreparedAction};
use crate::models::NewJobRun;
use crate::repositories::JobStore;

/// Result of one `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Another execution of the same job holds the guard; nothing was done.
    AlreadyRunning,
    NotFound,
    Disabled,
    Completed { job_run_id: i64, failed: bool },
}

/// Runs a job's action pipeline under the re-entrancy guard.
///
/// Fires from the scheduler and manual runs both go through [`execute`].
///
/// [`execute`]: ExecutionCoordinator::execute
pub struct ExecutionCoordinator {
    store: Arc<dyn JobStore>,
    runner: Arc<ActionRunner>,
    guard: Arc<ExecutionGuard>,
}

impl ExecutionCoordinator {
    pub fn new(
        store: Arc<dyn JobStore>,
        runner: Arc<ActionRunner>,
        guard: Arc<ExecutionGuard>,
    ) -> Self {
        Self {
            store,
            runner,
            guard,
        }
    }

    pub fn guard(&self) -> &Arc<ExecutionGuard> {
        &self.guard
    }

    pub fn runner(&self) -> &Arc<ActionRunner> {
        &self.runner
    }

    pub async fn execute(&self, job_id: i32) -> AppResult<ExecutionOutcome> {
        let Some(token) = self.guard.try_begin(job_id) else {
            tracing::warn!(job_id, "Job is already running, dropping this execution");
            return Ok(ExecutionOutcome::AlreadyRunning);
        };
        self.execute_claimed(token).await
    }

    /// Runs the job whose id `token` already holds in the guard.
    ///
    /// The token is released when this returns, on every path.
    pub async fn execute_claimed(&self, token: ExecutionToken) -> AppResult<ExecutionOutcome> {
        let job_id = token.job_id();

        let Some(definition) = self.store.load_job_definition(job_id).await? else {
            tracing::debug!(job_id, "Job no longer exists, skipping execution");
            return Ok(ExecutionOutcome::NotFound);
        };
        if !definition.job.enabled {
            tracing::debug!(job_id, "Job is disabled, skipping execution");
            return Ok(ExecutionOutcome::Disabled);
        }

        // Snapshot: later edits to the job do not affect this run.
        let pipeline: Vec<PreparedAction> = definition
            .actions
            .iter()
            .filter(|(action, _)| action.enabled)
            .map(|(action, parameters)| self.runner.prepare(action, parameters))
            .collect();

        let job_run = self
            .store
            .create_job_run(NewJobRun {
                job_id,
                job_name: definition.job.name.clone(),
                started_at: Utc::now().naive_utc(),
            })
            .await?;

        tracing::info!(
            job_id,
            job_run_id = job_run.id,
            job_name = %job_run.job_name,
            actions = pipeline.len(),
            "Job run started"
        );

        let mut failed = false;
        for (ordinal, prepared) in pipeline.iter().enumerate() {
            let succeeded = match self.runner.run(prepared, ordinal as i32, job_run.id).await {
                Ok(succeeded) => succeeded,
                Err(e) => {
                    tracing::error!(
                        job_id,
                        job_run_id = job_run.id,
                        action_id = prepared.action.id,
                        error = %e,
                        "Failed to record action run"
                    );
                    false
                }
            };
            if !succeeded {
                failed = true;
                break;
            }
        }

        if let Err(e) = self
            .store
            .finish_job_run(job_run.id, Utc::now().naive_utc(), failed)
            .await
        {
            tracing::error!(
                job_id,
                job_run_id = job_run.id,
                error = %e,
                "Failed to close job run"
            );
            return Err(e);
        }

        if failed {
            tracing::warn!(job_id, job_run_id = job_run.id, "Job run failed");
        } else {
            tracing::info!(job_id, job_run_id = job_run.id, "Job run completed");
        }

        Ok(ExecutionOutcome::Completed {
            job_run_id: job_run.id,
            failed,
        })
    }
}
