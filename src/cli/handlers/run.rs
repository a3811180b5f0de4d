//! Run command handler
//!
//! Executes a job immediately through the same coordinator the scheduler
//! fires into.

use serde::Serialize;

use super::history::{render_run_detail, to_json};
use crate::error::{AppError, AppResult};
use crate::jobs::ExecutionOutcome;
use crate::models::LogLevel;
use crate::services::RunDetail;
use crate::state::AppState;

pub struct RunCommandHandler {
    state: AppState,
}

#[derive(Serialize)]
struct RunReport<'a> {
    job_id: i32,
    #[serde(flatten)]
    outcome: &'a ExecutionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a RunDetail>,
}

impl RunCommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Prints the outcome, then maps anything but a successful run to an
    /// error so the process exits non-zero.
    pub async fn execute(&self, job_id: i32, json: bool) -> AppResult<()> {
        let outcome = self.state.engine.execute(job_id).await?;
        let detail = match outcome {
            ExecutionOutcome::Completed { job_run_id, .. } => {
                Some(self.state.jobs.run_detail(job_run_id).await?)
            }
            _ => None,
        };

        if json {
            println!(
                "{}",
                to_json(&RunReport {
                    job_id,
                    outcome: &outcome,
                    detail: detail.as_ref(),
                })?
            );
        } else {
            match &detail {
                Some(detail) => print!("{}", render_run_detail(detail)),
                None => println!("Job {}: {}", job_id, describe(&outcome)),
            }
        }

        outcome_result(job_id, outcome, detail.as_ref())
    }
}

fn describe(outcome: &ExecutionOutcome) -> &'static str {
    match outcome {
        ExecutionOutcome::AlreadyRunning => "already running, request dropped",
        ExecutionOutcome::NotFound => "not found",
        ExecutionOutcome::Disabled => "disabled, nothing executed",
        ExecutionOutcome::Completed { failed: false, .. } => "completed",
        ExecutionOutcome::Completed { failed: true, .. } => "failed",
    }
}

fn outcome_result(
    job_id: i32,
    outcome: ExecutionOutcome,
    detail: Option<&RunDetail>,
) -> AppResult<()> {
    match outcome {
        ExecutionOutcome::Completed { failed: false, .. } | ExecutionOutcome::AlreadyRunning => {
            Ok(())
        }
        ExecutionOutcome::NotFound => Err(AppError::not_found("Job", job_id)),
        ExecutionOutcome::Disabled => Err(AppError::validation(
            "job_id",
            format!("Job {} is disabled", job_id),
        )),
        ExecutionOutcome::Completed { job_run_id, .. } => {
            // The failing action is the last one attempted.
            let last = detail.and_then(|d| d.actions.last());
            let command = last
                .map(|a| a.run.command_name.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let message = last
                .and_then(|a| a.messages.iter().rev().find(|m| m.level == LogLevel::Error))
                .map(|m| m.message.clone())
                .unwrap_or_else(|| format!("run {} failed", job_run_id));
            Err(AppError::CommandExecution { command, message })
        }
    }
}
