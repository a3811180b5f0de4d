use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::commands::{CommandRegistry, SettingsDefaults};
use crate::config::Settings;
use crate::error::AppResult;
use crate::jobs::executor::{ExecutionCoordinator, ExecutionOutcome};
use crate::jobs::guard::ExecutionGuard;
use crate::jobs::runner::ActionRunner;
use crate::jobs::scheduler::{CronTriggerBackend, FireCallback, LiveState, TriggerBackend};
use crate::jobs::sync::{ScheduleSynchronizer, SyncOutcome, SyncReport};
use crate::repositories::JobStore;

/// Entry point for the admin and CLI layers.
///
/// Scheduled fires and manual runs share one coordinator, so they exclude
/// each other per job.
pub struct Engine {
    coordinator: Arc<ExecutionCoordinator>,
    synchronizer: ScheduleSynchronizer,
    backend: Arc<dyn TriggerBackend>,
    scheduler_enabled: bool,
}

impl Engine {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn TriggerBackend>,
        scheduler_enabled: bool,
    ) -> Self {
        Self {
            synchronizer: ScheduleSynchronizer::new(store, Arc::clone(&backend)),
            coordinator,
            backend,
            scheduler_enabled,
        }
    }

    /// Wires the built-in commands, configured defaults and a cron backend
    /// whose fires run on `scheduler.worker_threads` workers.
    pub async fn from_settings(settings: &Settings, store: Arc<dyn JobStore>) -> AppResult<Self> {
        let registry = Arc::new(CommandRegistry::with_builtins());
        let defaults = Arc::new(SettingsDefaults::from_settings(settings));
        let runner = Arc::new(ActionRunner::new(Arc::clone(&store), registry, defaults));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::clone(&store),
            runner,
            Arc::new(ExecutionGuard::new()),
        ));

        let on_fire = fire_callback(Arc::clone(&coordinator), settings.scheduler.worker_threads);
        let backend = Arc::new(CronTriggerBackend::new(on_fire).await?);

        Ok(Self::new(
            coordinator,
            store,
            backend,
            settings.scheduler.enabled,
        ))
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        self.coordinator.runner().registry()
    }

    pub fn is_running(&self, job_id: i32) -> bool {
        self.coordinator.guard().is_running(job_id)
    }

    pub async fn synchronize(&self, job_id: i32) -> AppResult<SyncOutcome> {
        self.synchronizer.sync(job_id).await
    }

    pub async fn synchronize_all(&self) -> AppResult<SyncReport> {
        self.synchronizer.synchronize_all().await
    }

    /// Runs `job_id` now, on the caller's task.
    pub async fn execute(&self, job_id: i32) -> AppResult<ExecutionOutcome> {
        self.coordinator.execute(job_id).await
    }

    pub async fn live_state(&self) -> AppResult<LiveState> {
        self.backend.live_state().await
    }

    /// Synchronizes every job, then starts firing triggers unless
    /// `scheduler.enabled` is off.
    pub async fn start(&self) -> AppResult<SyncReport> {
        let report = self.synchronize_all().await?;
        if self.scheduler_enabled {
            self.backend.start().await?;
            tracing::info!("Scheduler started");
        } else {
            tracing::warn!("Scheduler disabled by configuration, triggers will not fire");
        }
        Ok(report)
    }

    pub async fn stop(&self) -> AppResult<()> {
        self.backend.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

/// Fire callback that runs each execution on its own task, at most
/// `workers` at a time.
///
/// The job is claimed in the guard before waiting for a worker, so a fire
/// for a job that is running or already waiting is dropped rather than queued.
pub fn fire_callback(coordinator: Arc<ExecutionCoordinator>, workers: usize) -> FireCallback {
    let permits = Arc::new(Semaphore::new(workers.max(1)));

    Arc::new(move |job_id: i32| {
        let coordinator = Arc::clone(&coordinator);
        let permits = Arc::clone(&permits);

        async move {
            let Some(token) = coordinator.guard().try_begin(job_id) else {
                tracing::warn!(job_id, "Job is already running, dropping this fire");
                return;
            };

            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                tracing::debug!(job_id, "Trigger fired");
                if let Err(e) = coordinator.execute_claimed(token).await {
                    tracing::error!(job_id, error = %e, "Scheduled execution failed");
                }
            });
        }
        .boxed()
    })
}
