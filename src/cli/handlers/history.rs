//! History command handler
//!
//! Lists the runs of a job, or the action runs and messages of one run.

use chrono::NaiveDateTime;

use crate::error::{AppError, AppResult};
use crate::models::JobRun;
use crate::services::RunDetail;
use crate::state::AppState;

pub struct HistoryCommandHandler {
    state: AppState,
}

impl HistoryCommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn execute(
        &self,
        job_id: i32,
        limit: i64,
        run: Option<i64>,
        json: bool,
    ) -> AppResult<()> {
        match run {
            Some(run_id) => {
                let detail = self.state.jobs.run_detail(run_id).await?;
                if detail.run.job_id != job_id {
                    return Err(AppError::validation(
                        "run",
                        format!("Run {} does not belong to job {}", run_id, job_id),
                    ));
                }
                if json {
                    println!("{}", to_json(&detail)?);
                } else {
                    print!("{}", render_run_detail(&detail));
                }
            }
            None => {
                let runs = self.state.jobs.job_runs(job_id, limit, 0).await?;
                if json {
                    println!("{}", to_json(&runs)?);
                } else {
                    print!("{}", render_runs(&runs));
                }
            }
        }
        Ok(())
    }
}

pub(super) fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Internal { source: e.into() })
}

pub(super) fn format_time(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(super) fn run_status(run: &JobRun) -> &'static str {
    match (run.is_running(), run.error) {
        (true, _) => "running",
        (false, false) => "ok",
        (false, true) => "failed",
    }
}

pub(super) fn render_runs(runs: &[JobRun]) -> String {
    if runs.is_empty() {
        return "No runs recorded\n".to_string();
    }

    let mut out = format!("{:<8} {:<20} {:<20} {}\n", "RUN", "STARTED", "ENDED", "STATUS");
    for run in runs {
        let ended = run.ended_at.as_ref().map(format_time).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<8} {:<20} {:<20} {}\n",
            run.id,
            format_time(&run.started_at),
            ended,
            run_status(run)
        ));
    }
    out
}

pub(super) fn render_run_detail(detail: &RunDetail) -> String {
    let run = &detail.run;
    let mut out = format!(
        "Run {} of job {} ({}) started {}: {}\n",
        run.id,
        run.job_id,
        run.job_name,
        format_time(&run.started_at),
        run_status(run)
    );

    for action in &detail.actions {
        out.push_str(&format!(
            "  [{}] {} (action {})\n",
            action.run.ordinal, action.run.command_name, action.run.action_id
        ));
        for message in &action.messages {
            out.push_str(&format!(
                "      {:<5} {}\n",
                message.level.as_str().to_uppercase(),
                message.message
            ));
            if let Some(detail) = &message.error_detail {
                for line in detail.lines() {
                    out.push_str(&format!("            {}\n", line));
                }
            }
        }
    }
    out
}
