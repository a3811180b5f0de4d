//! Sync command handler

use crate::error::{AppError, AppResult};
use crate::jobs::{SyncOutcome, SyncReport};
use crate::state::AppState;

pub struct SyncCommandHandler {
    state: AppState,
}

impl SyncCommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Synchronizes one job or all of them and prints the resulting live
    /// triggers. Any job left unscheduled makes the command fail.
    pub async fn execute(&self, job_id: Option<i32>) -> AppResult<()> {
        let report = match job_id {
            Some(job_id) => {
                let outcome = self.state.engine.synchronize(job_id).await?;
                SyncReport {
                    synchronized: vec![(job_id, outcome)],
                    failed: Vec::new(),
                }
            }
            None => self.state.engine.synchronize_all().await?,
        };

        print!("{}", render_report(&report));

        let live = self.state.engine.live_state().await?;
        for (job_id, triggers) in &live {
            for (schedule_id, descriptor) in triggers {
                println!("  job {} schedule {}: {}", job_id, schedule_id, descriptor);
            }
        }

        if report.is_success() {
            Ok(())
        } else {
            Err(AppError::scheduler(
                "synchronize jobs",
                anyhow::anyhow!("{} job(s) could not be synchronized", report.failed.len()),
            ))
        }
    }
}

fn render_report(report: &SyncReport) -> String {
    let mut out = String::new();
    for (job_id, outcome) in &report.synchronized {
        let line = match outcome {
            SyncOutcome::Removed => format!("Job {}: triggers removed\n", job_id),
            SyncOutcome::Unchanged => format!("Job {}: nothing to schedule\n", job_id),
            SyncOutcome::Installed { triggers } => {
                format!("Job {}: {} trigger(s) installed\n", job_id, triggers)
            }
        };
        out.push_str(&line);
    }
    for (job_id, error) in &report.failed {
        out.push_str(&format!("Job {}: FAILED ({})\n", job_id, error));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::{NewJob, NewSchedule};

    #[test]
    fn test_render_report() {
        let report = SyncReport {
            synchronized: vec![
                (1, SyncOutcome::Installed { triggers: 2 }),
                (2, SyncOutcome::Removed),
            ],
            failed: vec![(3, "no day selected".to_string())],
        };
        assert_eq!(
            render_report(&report),
            "Job 1: 2 trigger(s) installed\nJob 2: triggers removed\n\
             Job 3: FAILED (no day selected)\n"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_single_job() {
        let state = AppState::initialize(Settings::default()).await.unwrap();
        let job = state
            .jobs
            .create_job(NewJob {
                name: "daily".to_string(),
                group_name: "default".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        state
            .store
            .create_schedule(NewSchedule::weekly(job.id, [true; 7], 1, 0))
            .await
            .unwrap();

        SyncCommandHandler::new(state.clone())
            .execute(Some(job.id))
            .await
            .unwrap();
        assert_eq!(state.engine.live_state().await.unwrap()[&job.id].len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_reports_unschedulable_job() {
        let state = AppState::initialize(Settings::default()).await.unwrap();
        let job = state
            .jobs
            .create_job(NewJob {
                name: "never".to_string(),
                group_name: "default".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        state
            .store
            .create_schedule(NewSchedule::weekly(job.id, [false; 7], 1, 0))
            .await
            .unwrap();

        let err = SyncCommandHandler::new(state).execute(None).await.unwrap_err();
        assert!(matches!(err, AppError::SchedulerBackend { .. }));
    }
}
