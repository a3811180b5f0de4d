use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioCronScheduler};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::recurrence::Recurrence;

/// Live triggers: job id -> (schedule id -> descriptor).
pub type LiveState = BTreeMap<i32, BTreeMap<i32, String>>;

/// Invoked with the job id whenever one of its triggers fires.
pub type FireCallback = Arc<dyn Fn(i32) -> BoxFuture<'static, ()> + Send + Sync>;

/// The in-process trigger scheduler, as seen by the synchronizer.
///
/// A job entry exists independently of its triggers; every trigger belongs
/// to one job entry and one schedule id.
#[async_trait]
pub trait TriggerBackend: Send + Sync {
    async fn job_exists(&self, job_id: i32) -> AppResult<bool>;

    /// Registers `job_id`, dropping any triggers it already had.
    async fn add_job(&self, job_id: i32) -> AppResult<()>;

    /// Removes the job entry and all its triggers. Returns whether it existed.
    async fn remove_job(&self, job_id: i32) -> AppResult<bool>;

    async fn remove_trigger(&self, job_id: i32, schedule_id: i32) -> AppResult<bool>;

    /// Installs a trigger for an already registered job.
    async fn schedule_trigger(
        &self,
        job_id: i32,
        schedule_id: i32,
        recurrence: &Recurrence,
    ) -> AppResult<()>;

    async fn live_state(&self) -> AppResult<LiveState>;

    async fn start(&self) -> AppResult<()>;

    async fn shutdown(&self) -> AppResult<()>;
}

struct Inner {
    scheduler: TokioCronScheduler,
    entries: BTreeMap<i32, BTreeMap<i32, (Uuid, String)>>,
    started: bool,
}

/// [`TriggerBackend`] on top of tokio-cron-scheduler.
///
/// Triggers fire in UTC. Each trigger is a cron job whose callback hands the
/// job id to the fire callback.
pub struct CronTriggerBackend {
    inner: Mutex<Inner>,
    on_fire: FireCallback,
}

impl CronTriggerBackend {
    pub async fn new(on_fire: FireCallback) -> AppResult<Self> {
        let scheduler = TokioCronScheduler::new()
            .await
            .map_err(|e| AppError::scheduler("create scheduler", e))?;

        Ok(Self {
            inner: Mutex::new(Inner {
                scheduler,
                entries: BTreeMap::new(),
                started: false,
            }),
            on_fire,
        })
    }
}

impl Inner {
    /// Removes one trigger from the scheduler, then from the bookkeeping.
    ///
    /// On failure the entry stays recorded so a later sync can retry it.
    async fn remove_trigger(&mut self, job_id: i32, schedule_id: i32) -> AppResult<bool> {
        let Some(uuid) = self
            .entries
            .get(&job_id)
            .and_then(|triggers| triggers.get(&schedule_id))
            .map(|(uuid, _)| *uuid)
        else {
            return Ok(false);
        };

        self.scheduler
            .remove(&uuid)
            .await
            .map_err(|e| AppError::scheduler("remove trigger", e))?;
        if let Some(triggers) = self.entries.get_mut(&job_id) {
            triggers.remove(&schedule_id);
        }
        Ok(true)
    }

    async fn clear_triggers(&mut self, job_id: i32) -> AppResult<()> {
        let schedule_ids: Vec<i32> = self
            .entries
            .get(&job_id)
            .map(|triggers| triggers.keys().copied().collect())
            .unwrap_or_default();
        for schedule_id in schedule_ids {
            self.remove_trigger(job_id, schedule_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerBackend for CronTriggerBackend {
    async fn job_exists(&self, job_id: i32) -> AppResult<bool> {
        Ok(self.inner.lock().await.entries.contains_key(&job_id))
    }

    async fn add_job(&self, job_id: i32) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.clear_triggers(job_id).await?;
        inner.entries.entry(job_id).or_default();
        Ok(())
    }

    async fn remove_job(&self, job_id: i32) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.entries.contains_key(&job_id) {
            return Ok(false);
        }
        inner.clear_triggers(job_id).await?;
        inner.entries.remove(&job_id);
        Ok(true)
    }

    async fn remove_trigger(&self, job_id: i32, schedule_id: i32) -> AppResult<bool> {
        self.inner
            .lock()
            .await
            .remove_trigger(job_id, schedule_id)
            .await
    }

    async fn schedule_trigger(
        &self,
        job_id: i32,
        schedule_id: i32,
        recurrence: &Recurrence,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.entries.contains_key(&job_id) {
            return Err(AppError::scheduler(
                "schedule trigger",
                anyhow::anyhow!("job {} is not registered", job_id),
            ));
        }

        let expression = recurrence.cron_expression().ok_or_else(|| {
            AppError::scheduler(
                "schedule trigger",
                anyhow::anyhow!("schedule {} has no day selected", schedule_id),
            )
        })?;

        let on_fire = Arc::clone(&self.on_fire);
        let cron_job = Job::new_async(expression.as_str(), move |_uuid, _lock| on_fire(job_id))
            .map_err(|e| AppError::scheduler(format!("parse '{}'", expression), e))?;

        inner.remove_trigger(job_id, schedule_id).await?;
        let uuid = inner
            .scheduler
            .add(cron_job)
            .await
            .map_err(|e| AppError::scheduler("add trigger", e))?;

        if let Some(triggers) = inner.entries.get_mut(&job_id) {
            triggers.insert(schedule_id, (uuid, recurrence.encode()));
        }

        tracing::debug!(
            job_id,
            schedule_id,
            cron = %expression,
            recurrence = %recurrence,
            "Trigger installed"
        );
        Ok(())
    }

    async fn live_state(&self) -> AppResult<LiveState> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .map(|(job_id, triggers)| {
                let triggers = triggers
                    .iter()
                    .map(|(schedule_id, (_, descriptor))| (*schedule_id, descriptor.clone()))
                    .collect();
                (*job_id, triggers)
            })
            .collect())
    }

    async fn start(&self) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.started {
            return Ok(());
        }
        inner
            .scheduler
            .start()
            .await
            .map_err(|e| AppError::scheduler("start scheduler", e))?;
        inner.started = true;
        Ok(())
    }

    async fn shutdown(&self) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.started {
            return Ok(());
        }
        inner
            .scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::scheduler("shutdown scheduler", e))?;
        inner.started = false;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory backend with injectable failures.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        state: Mutex<LiveState>,
        failing_schedules: Mutex<BTreeSet<i32>>,
        failing_removals: Mutex<BTreeSet<i32>>,
        failing_adds: Mutex<BTreeSet<i32>>,
        pub(crate) installs: AtomicUsize,
    }

    impl FakeBackend {
        pub(crate) async fn fail_install_of(&self, schedule_id: i32) {
            self.failing_schedules.lock().await.insert(schedule_id);
        }

        pub(crate) async fn fail_removal_of(&self, job_id: i32) {
            self.failing_removals.lock().await.insert(job_id);
        }

        pub(crate) async fn fail_add_of(&self, job_id: i32) {
            self.failing_adds.lock().await.insert(job_id);
        }

        pub(crate) async fn heal(&self) {
            self.failing_schedules.lock().await.clear();
            self.failing_removals.lock().await.clear();
            self.failing_adds.lock().await.clear();
        }

        pub(crate) fn install_count(&self) -> usize {
            self.installs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TriggerBackend for FakeBackend {
        async fn job_exists(&self, job_id: i32) -> AppResult<bool> {
            Ok(self.state.lock().await.contains_key(&job_id))
        }

        async fn add_job(&self, job_id: i32) -> AppResult<()> {
            if self.failing_adds.lock().await.contains(&job_id) {
                return Err(AppError::scheduler("add job", anyhow::anyhow!("injected")));
            }
            self.state.lock().await.insert(job_id, BTreeMap::new());
            Ok(())
        }

        async fn remove_job(&self, job_id: i32) -> AppResult<bool> {
            if self.failing_removals.lock().await.contains(&job_id) {
                return Err(AppError::scheduler("remove job", anyhow::anyhow!("injected")));
            }
            Ok(self.state.lock().await.remove(&job_id).is_some())
        }

        async fn remove_trigger(&self, job_id: i32, schedule_id: i32) -> AppResult<bool> {
            Ok(self
                .state
                .lock()
                .await
                .get_mut(&job_id)
                .and_then(|t| t.remove(&schedule_id))
                .is_some())
        }

        async fn schedule_trigger(
            &self,
            job_id: i32,
            schedule_id: i32,
            recurrence: &Recurrence,
        ) -> AppResult<()> {
            if self.failing_schedules.lock().await.contains(&schedule_id)
                || !recurrence.has_any_day()
            {
                return Err(AppError::scheduler("schedule trigger", anyhow::anyhow!("injected")));
            }
            let mut state = self.state.lock().await;
            let Some(triggers) = state.get_mut(&job_id) else {
                return Err(AppError::scheduler("schedule trigger", anyhow::anyhow!("no job")));
            };
            triggers.insert(schedule_id, recurrence.encode());
            self.installs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn live_state(&self) -> AppResult<LiveState> {
            Ok(self.state.lock().await.clone())
        }

        async fn start(&self) -> AppResult<()> {
            Ok(())
        }

        async fn shutdown(&self) -> AppResult<()> {
            Ok(())
        }
    }
}
