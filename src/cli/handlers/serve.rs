//! Serve command handler
//!
//! Starts the scheduler and keeps it running until a shutdown signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::jobs::Engine;
use crate::state::AppState;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Validates and exits on `dry_run`; otherwise serves until Ctrl-C or
    /// SIGTERM.
    pub async fn execute(&self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            return self.validate_only();
        }

        let state = AppState::initialize(self.config.clone()).await?;
        self.serve(state, shutdown_signal()).await
    }

    /// Validate configuration without starting the scheduler
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        let scheduler = &self.config.scheduler;
        println!("✓ Configuration is valid");
        if self.config.database.is_memory() {
            println!("✓ Job store: in-memory (definitions are not persisted)");
        } else {
            println!("✓ Job store: PostgreSQL");
        }
        println!(
            "✓ Scheduler {} with {} worker(s)",
            if scheduler.enabled { "enabled" } else { "disabled" },
            scheduler.worker_threads
        );
        match scheduler.resync_interval_secs {
            0 => println!("✓ Periodic resynchronization disabled"),
            secs => println!("✓ Resynchronizing every {}s", secs),
        }
        println!("✓ Command defaults configured for {} command(s)", self.config.commands.len());
        println!("Dry run completed successfully");
        Ok(())
    }

    /// Synchronizes every job, starts the backend and waits for `shutdown`.
    ///
    /// The periodic resync task is stopped before the backend shuts down.
    pub async fn serve<F>(&self, state: AppState, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let report = state.engine.start().await?;
        tracing::info!(
            jobs = report.synchronized.len(),
            failed = report.failed.len(),
            "Initial synchronization complete"
        );
        for (job_id, error) in &report.failed {
            tracing::warn!(job_id, error = %error, "Job could not be scheduled");
        }

        let token = CancellationToken::new();
        let resync = match self.config.scheduler.resync_interval_secs {
            0 => None,
            secs => Some(spawn_resync(
                Arc::clone(&state.engine),
                Duration::from_secs(secs),
                token.child_token(),
            )),
        };

        shutdown.await;

        token.cancel();
        if let Some(handle) = resync
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Resync task ended abnormally");
        }

        state.engine.stop().await?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

/// Resynchronizes every job on each tick until `token` is cancelled.
fn spawn_resync(
    engine: Arc<Engine>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and startup already synced.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => match engine.synchronize_all().await {
                    Ok(report) if report.is_success() => {
                        tracing::debug!(jobs = report.synchronized.len(), "Periodic resync complete");
                    }
                    Ok(report) => {
                        tracing::warn!(failed = ?report.failed, "Periodic resync left jobs unscheduled");
                    }
                    Err(e) => tracing::error!(error = %e, "Periodic resync failed"),
                },
            }
        }
    })
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewJob, NewSchedule};

    #[test]
    fn test_dry_run_validates_config() {
        let handler = ServeCommandHandler::new(Settings::default());
        assert!(handler.validate_only().is_ok());

        let mut invalid = Settings::default();
        invalid.database.url = String::new();
        assert!(ServeCommandHandler::new(invalid).validate_only().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serve_installs_triggers_until_shutdown() {
        let mut settings = Settings::default();
        settings.scheduler.resync_interval_secs = 1;
        let state = AppState::initialize(settings.clone()).await.unwrap();

        let job = state
            .jobs
            .create_job(NewJob {
                name: "weekly".to_string(),
                group_name: "default".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        state
            .jobs
            .add_schedule(NewSchedule::weekly(job.id, [true; 7], 3, 0))
            .await
            .unwrap();

        let engine = Arc::clone(&state.engine);
        let shutdown = async move {
            let live = engine.live_state().await.unwrap();
            assert_eq!(live[&job.id].len(), 1);
        };

        ServeCommandHandler::new(settings)
            .serve(state, shutdown)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resync_task_stops_on_cancel() {
        let state = AppState::initialize(Settings::default()).await.unwrap();
        let token = CancellationToken::new();
        let handle = spawn_resync(
            Arc::clone(&state.engine),
            Duration::from_millis(10),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
