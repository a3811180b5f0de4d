//! Reconciliation of persisted schedules with the live trigger backend.
//!
//! Persisted state is only read here. A job is materialized when it exists,
//! is enabled and has at least one enabled schedule; otherwise any live entry
//! for it is removed. Triggers are always reinstalled wholesale.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AppResult;
use crate::jobs::recurrence::Recurrence;
use crate::jobs::scheduler::TriggerBackend;
use crate::repositories::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A live entry existed and was removed.
    Removed,
    /// Nothing is scheduled and nothing should be.
    Unchanged,
    Installed { triggers: usize },
}

/// Per-job results of a full synchronization
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub synchronized: Vec<(i32, SyncOutcome)>,
    pub failed: Vec<(i32, String)>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ScheduleSynchronizer {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn TriggerBackend>,
}

impl ScheduleSynchronizer {
    pub fn new(store: Arc<dyn JobStore>, backend: Arc<dyn TriggerBackend>) -> Self {
        Self { store, backend }
    }

    /// Brings the live entry for `job_id` in line with the store.
    pub async fn sync(&self, job_id: i32) -> AppResult<SyncOutcome> {
        let job = self.store.get_job(job_id).await?;
        let schedules = match &job {
            Some(job) if job.enabled => self
                .store
                .schedules_for_job(job_id)
                .await?
                .into_iter()
                .filter(|s| s.enabled)
                .collect(),
            _ => Vec::new(),
        };

        if schedules.is_empty() {
            return self.remove(job_id).await;
        }

        if let Err(e) = self.backend.add_job(job_id).await {
            tracing::error!(job_id, error = %e, "Failed to register job, removing it from scheduler");
            self.rollback(job_id).await;
            return Err(e);
        }

        for schedule in &schedules {
            let recurrence = Recurrence::from(schedule);
            let installed = match self.backend.remove_trigger(job_id, schedule.id).await {
                Ok(_) => {
                    self.backend
                        .schedule_trigger(job_id, schedule.id, &recurrence)
                        .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = installed {
                tracing::error!(
                    job_id,
                    schedule_id = schedule.id,
                    descriptor = %recurrence.encode(),
                    error = %e,
                    "Failed to install trigger, removing job from scheduler"
                );
                self.rollback(job_id).await;
                return Err(e);
            }
        }

        tracing::info!(job_id, triggers = schedules.len(), "Job scheduled");
        Ok(SyncOutcome::Installed {
            triggers: schedules.len(),
        })
    }

    async fn rollback(&self, job_id: i32) {
        if let Err(e) = self.backend.remove_job(job_id).await {
            tracing::error!(job_id, error = %e, "Rollback failed");
        }
    }

    async fn remove(&self, job_id: i32) -> AppResult<SyncOutcome> {
        if !self.backend.job_exists(job_id).await? {
            return Ok(SyncOutcome::Unchanged);
        }

        match self.backend.remove_job(job_id).await {
            Ok(_) => {
                tracing::info!(job_id, "Job removed from scheduler");
                Ok(SyncOutcome::Removed)
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to remove job from scheduler");
                Err(e)
            }
        }
    }

    /// Syncs every persisted job and every job the backend still holds.
    pub async fn synchronize_all(&self) -> AppResult<SyncReport> {
        let mut job_ids: BTreeSet<i32> = self
            .store
            .list_jobs()
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();
        job_ids.extend(self.backend.live_state().await?.into_keys());

        let mut report = SyncReport::default();
        for job_id in job_ids {
            match self.sync(job_id).await {
                Ok(outcome) => report.synchronized.push((job_id, outcome)),
                Err(e) => report.failed.push((job_id, e.to_string())),
            }
        }

        tracing::info!(
            synchronized = report.synchronized.len(),
            failed = report.failed.len(),
            "Schedule synchronization finished"
        );
        Ok(report)
    }
}
