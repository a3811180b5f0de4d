//! Job administration: CRUD over definitions plus run history.
//!
//! Every mutation of a job, schedule or action resynchronizes that job's live
//! triggers. A failed resync is logged and left for the next full
//! synchronization; the mutation itself stays committed.

use std::sync::Arc;

use serde::Serialize;

use crate::commands::{Command, find_parameter};
use crate::error::{AppError, AppResult};
use crate::jobs::Engine;
use crate::models::{
    Action, ActionParameter, ActionRun, Job, JobDefinition, JobRun, LogMessage, NewAction,
    NewActionParameter, NewJob, NewSchedule, Schedule, UpdateAction, UpdateActionParameter,
    UpdateJob, UpdateSchedule,
};
use crate::repositories::JobStore;

/// A job run with its action runs and their log messages
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub run: JobRun,
    pub actions: Vec<ActionRunDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRunDetail {
    pub run: ActionRun,
    pub messages: Vec<LogMessage>,
}

#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    engine: Arc<Engine>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, engine: Arc<Engine>) -> Self {
        Self { store, engine }
    }

    async fn resync(&self, job_id: i32) {
        if let Err(e) = self.engine.synchronize(job_id).await {
            tracing::error!(job_id, error = %e, "Schedule synchronization after change failed");
        }
    }

    fn resolve_command(&self, name: &str) -> AppResult<Arc<dyn Command>> {
        self.engine.registry().resolve(name).ok_or_else(|| {
            AppError::validation("command_name", format!("Unknown command '{}'", name))
        })
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    pub async fn create_job(&self, new_job: NewJob) -> AppResult<Job> {
        if new_job.name.trim().is_empty() {
            return Err(AppError::validation("name", "Job name must not be empty"));
        }
        let job = self.store.create_job(new_job).await?;
        tracing::info!(job_id = job.id, name = %job.name, "Job created");
        self.resync(job.id).await;
        Ok(job)
    }

    pub async fn get_job(&self, id: i32) -> AppResult<Job> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found("Job", id))
    }

    pub async fn get_definition(&self, id: i32) -> AppResult<JobDefinition> {
        self.store
            .load_job_definition(id)
            .await?
            .ok_or_else(|| AppError::not_found("Job", id))
    }

    pub async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        self.store.list_jobs().await
    }

    pub async fn update_job(&self, id: i32, update: UpdateJob) -> AppResult<Job> {
        if update.is_empty() {
            return Err(AppError::validation("job", "Nothing to update"));
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::validation("name", "Job name must not be empty"));
        }
        let job = self.store.update_job(id, update).await?;
        self.resync(id).await;
        Ok(job)
    }

    pub async fn set_job_enabled(&self, id: i32, enabled: bool) -> AppResult<Job> {
        self.update_job(id, UpdateJob {
            enabled: Some(enabled),
            ..Default::default()
        })
        .await
    }

    pub async fn delete_job(&self, id: i32) -> AppResult<()> {
        self.store.delete_job(id).await?;
        tracing::info!(job_id = id, "Job deleted");
        self.resync(id).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    pub async fn add_schedule(&self, schedule: NewSchedule) -> AppResult<Schedule> {
        self.get_job(schedule.job_id).await?;
        let schedule = self.store.create_schedule(schedule).await?;
        self.resync(schedule.job_id).await;
        Ok(schedule)
    }

    pub async fn update_schedule(&self, id: i32, update: UpdateSchedule) -> AppResult<Schedule> {
        if update.is_empty() {
            return Err(AppError::validation("schedule", "Nothing to update"));
        }
        let schedule = self.store.update_schedule(id, update).await?;
        self.resync(schedule.job_id).await;
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, id: i32) -> AppResult<Schedule> {
        let schedule = self.store.delete_schedule(id).await?;
        self.resync(schedule.job_id).await;
        Ok(schedule)
    }

    // ------------------------------------------------------------------
    // Actions and parameters
    // ------------------------------------------------------------------

    /// Adds an action bound to a registered command, with every declared
    /// parameter created disabled at its default.
    pub async fn add_action(&self, new_action: NewAction) -> AppResult<Action> {
        self.get_job(new_action.job_id).await?;
        let command = self.resolve_command(&new_action.command_name)?;
        let action = self.store.create_action(new_action).await?;
        self.reconcile_parameters(&action, command.as_ref()).await?;
        self.resync(action.job_id).await;
        Ok(action)
    }

    /// Updates an action; rebinding it to another command reconciles its
    /// parameters against the new command's declared set.
    pub async fn update_action(&self, id: i32, update: UpdateAction) -> AppResult<Action> {
        if update.is_empty() {
            return Err(AppError::validation("action", "Nothing to update"));
        }
        let command = match &update.command_name {
            Some(name) => Some(self.resolve_command(name)?),
            None => None,
        };

        let action = self.store.update_action(id, update).await?;
        if let Some(command) = command {
            self.reconcile_parameters(&action, command.as_ref()).await?;
        }
        self.resync(action.job_id).await;
        Ok(action)
    }

    pub async fn delete_action(&self, id: i32) -> AppResult<Action> {
        let action = self.store.delete_action(id).await?;
        self.resync(action.job_id).await;
        Ok(action)
    }

    /// Matching names keep their value and take the declared casing;
    /// undeclared and duplicate names are deleted; missing declared names
    /// are created disabled with the declared default.
    async fn reconcile_parameters(&self, action: &Action, command: &dyn Command) -> AppResult<()> {
        let specs = command.parameters();
        let mut matched = vec![false; specs.len()];

        for parameter in self.store.parameters_for_action(action.id).await? {
            let index = specs
                .iter()
                .position(|spec| spec.name.eq_ignore_ascii_case(&parameter.name));

            match index {
                Some(i) if !matched[i] => {
                    matched[i] = true;
                    if parameter.name != specs[i].name {
                        self.store
                            .update_parameter(parameter.id, UpdateActionParameter {
                                name: Some(specs[i].name.clone()),
                                ..Default::default()
                            })
                            .await?;
                    }
                }
                _ => {
                    tracing::debug!(
                        action_id = action.id,
                        parameter = %parameter.name,
                        command = command.name(),
                        "Dropping parameter not declared by command"
                    );
                    self.store.delete_parameter(parameter.id).await?;
                }
            }
        }

        for (spec, _) in specs.iter().zip(matched).filter(|(_, m)| !m) {
            self.store
                .create_parameter(NewActionParameter {
                    action_id: action.id,
                    name: spec.name.clone(),
                    value: spec.default.clone().unwrap_or_default(),
                    enabled: false,
                })
                .await?;
        }

        Ok(())
    }

    async fn action_command(&self, action_id: i32) -> AppResult<(Action, Arc<dyn Command>)> {
        let action = self
            .store
            .get_action(action_id)
            .await?
            .ok_or_else(|| AppError::not_found("Action", action_id))?;
        let command = self.resolve_command(&action.command_name)?;
        Ok((action, command))
    }

    /// Sets and enables the parameter `name` on an action, validating the
    /// value against the command's declaration.
    pub async fn set_parameter(
        &self,
        action_id: i32,
        name: &str,
        value: &str,
    ) -> AppResult<ActionParameter> {
        let (action, command) = self.action_command(action_id).await?;
        let specs = command.parameters();
        let spec = find_parameter(&specs, name).ok_or_else(|| {
            AppError::validation(
                name,
                format!("Command '{}' does not declare this parameter", command.name()),
            )
        })?;
        spec.validate(value)?;

        let existing = self
            .store
            .parameters_for_action(action.id)
            .await?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name));

        match existing {
            Some(parameter) => {
                self.store
                    .update_parameter(parameter.id, UpdateActionParameter {
                        name: Some(spec.name.clone()),
                        value: Some(value.to_string()),
                        enabled: Some(true),
                    })
                    .await
            }
            None => {
                self.store
                    .create_parameter(NewActionParameter {
                        action_id: action.id,
                        name: spec.name.clone(),
                        value: value.to_string(),
                        enabled: true,
                    })
                    .await
            }
        }
    }

    /// Disables the override for `name` so the configured default applies.
    pub async fn unset_parameter(&self, action_id: i32, name: &str) -> AppResult<ActionParameter> {
        let parameter = self
            .store
            .parameters_for_action(action_id)
            .await?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| AppError::NotFound {
                entity: "ActionParameter".to_string(),
                field: "name".to_string(),
                value: name.to_string(),
            })?;

        self.store
            .update_parameter(parameter.id, UpdateActionParameter {
                enabled: Some(false),
                ..Default::default()
            })
            .await
    }

    pub async fn update_parameter(
        &self,
        id: i32,
        update: UpdateActionParameter,
    ) -> AppResult<ActionParameter> {
        if update.is_empty() {
            return Err(AppError::validation("parameter", "Nothing to update"));
        }
        let parameter = self
            .store
            .get_parameter(id)
            .await?
            .ok_or_else(|| AppError::not_found("ActionParameter", id))?;

        if let Some(value) = &update.value {
            let (_, command) = self.action_command(parameter.action_id).await?;
            let specs = command.parameters();
            let name = update.name.as_deref().unwrap_or(&parameter.name);
            if let Some(spec) = find_parameter(&specs, name) {
                spec.validate(value)?;
            }
        }

        self.store.update_parameter(id, update).await
    }

    pub async fn delete_parameter(&self, id: i32) -> AppResult<ActionParameter> {
        self.store.delete_parameter(id).await
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub async fn job_runs(&self, job_id: i32, limit: i64, offset: i64) -> AppResult<Vec<JobRun>> {
        if limit <= 0 {
            return Err(AppError::validation("limit", "Limit must be positive"));
        }
        self.store.job_runs(job_id, limit, offset.max(0)).await
    }

    pub async fn run_detail(&self, job_run_id: i64) -> AppResult<RunDetail> {
        let run = self
            .store
            .get_job_run(job_run_id)
            .await?
            .ok_or_else(|| AppError::not_found("JobRun", job_run_id))?;

        let mut actions = Vec::new();
        for action_run in self.store.action_runs(job_run_id).await? {
            let messages = self.store.log_messages(action_run.id).await?;
            actions.push(ActionRunDetail {
                run: action_run,
                messages,
            });
        }

        Ok(RunDetail { run, actions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandRegistry, SettingsDefaults};
    use crate::jobs::scheduler::testing::FakeBackend;
    use crate::jobs::{ActionRunner, ExecutionCoordinator, ExecutionGuard, ExecutionOutcome};
    use crate::repositories::MemoryJobStore;

    struct Fixture {
        service: JobService,
        engine: Arc<Engine>,
        store: Arc<MemoryJobStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryJobStore::new());
        let runner = ActionRunner::new(
            store.clone(),
            Arc::new(CommandRegistry::with_builtins()),
            Arc::new(SettingsDefaults::default()),
        );
        let coordinator = Arc::new(ExecutionCoordinator::new(
            store.clone(),
            Arc::new(runner),
            Arc::new(ExecutionGuard::new()),
        ));
        let engine = Arc::new(Engine::new(
            coordinator,
            store.clone(),
            Arc::new(FakeBackend::default()),
            true,
        ));
        Fixture {
            service: JobService::new(store.clone(), engine.clone()),
            engine,
            store,
        }
    }

    fn new_job(name: &str) -> NewJob {
        NewJob {
            name: name.to_string(),
            group_name: "default".to_string(),
            enabled: true,
        }
    }

    fn new_action(job_id: i32, command: &str) -> NewAction {
        NewAction {
            job_id,
            command_name: command.to_string(),
            position: 0,
            enabled: true,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_schedule_mutations_resynchronize() {
        let f = fixture();
        let job = f.service.create_job(new_job("nightly")).await.unwrap();
        assert!(f.engine.live_state().await.unwrap().is_empty());

        let schedule = f
            .service
            .add_schedule(NewSchedule::weekly(job.id, [true; 7], 2, 30))
            .await
            .unwrap();
        assert_eq!(
            f.engine.live_state().await.unwrap()[&job.id][&schedule.id],
            "0230YYYYYYY"
        );

        f.service.set_job_enabled(job.id, false).await.unwrap();
        assert!(f.engine.live_state().await.unwrap().is_empty());

        f.service.set_job_enabled(job.id, true).await.unwrap();
        f.service.delete_schedule(schedule.id).await.unwrap();
        assert!(f.engine.live_state().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_job_removes_triggers() {
        let f = fixture();
        let job = f.service.create_job(new_job("weekly")).await.unwrap();
        f.service
            .add_schedule(NewSchedule::weekly(job.id, [true; 7], 2, 30))
            .await
            .unwrap();

        f.service.delete_job(job.id).await.unwrap();

        assert!(f.engine.live_state().await.unwrap().is_empty());
        assert!(matches!(
            f.service.get_job(job.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_updates_and_blank_names_are_rejected() {
        let f = fixture();
        let job = f.service.create_job(new_job("x")).await.unwrap();

        assert!(matches!(
            f.service.update_job(job.id, UpdateJob::default()).await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            f.service.create_job(new_job("  ")).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_action_creates_declared_parameters_disabled() {
        let f = fixture();
        let job = f.service.create_job(new_job("purge")).await.unwrap();
        let action = f.service.add_action(new_action(job.id, "purgehistory")).await.unwrap();

        let parameters = f.store.parameters_for_action(action.id).await.unwrap();
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0].name, "RetentionDays");
        assert_eq!(parameters[0].value, "30");
        assert!(!parameters[0].enabled);

        assert!(matches!(
            f.service.add_action(new_action(job.id, "nope")).await,
            Err(AppError::Validation { ref field, .. }) if field == "command_name"
        ));
    }

    #[tokio::test]
    async fn test_rebinding_reconciles_parameters() {
        let f = fixture();
        let job = f.service.create_job(new_job("rebind")).await.unwrap();
        let action = f.service.add_action(new_action(job.id, "echo")).await.unwrap();
        f.service.set_parameter(action.id, "message", "hi").await.unwrap();
        f.store
            .create_parameter(NewActionParameter {
                action_id: action.id,
                name: "command".to_string(),
                value: "ls".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        f.service
            .update_action(action.id, UpdateAction {
                command_name: Some("Shell".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut names: Vec<(String, String, bool)> = f
            .store
            .parameters_for_action(action.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.value, p.enabled))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("Command".to_string(), "ls".to_string(), true),
                ("WorkingDirectory".to_string(), String::new(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_parameter_validates_value() {
        let f = fixture();
        let job = f.service.create_job(new_job("purge")).await.unwrap();
        let action = f.service.add_action(new_action(job.id, "PurgeHistory")).await.unwrap();

        assert!(f.service.set_parameter(action.id, "retentiondays", "0").await.is_err());
        assert!(f.service.set_parameter(action.id, "Undeclared", "1").await.is_err());

        let parameter = f
            .service
            .set_parameter(action.id, "retentiondays", "14")
            .await
            .unwrap();
        assert_eq!(parameter.name, "RetentionDays");
        assert!(parameter.enabled);

        let err = f
            .service
            .update_parameter(parameter.id, UpdateActionParameter {
                value: Some("forever".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let unset = f.service.unset_parameter(action.id, "RETENTIONDAYS").await.unwrap();
        assert_eq!((unset.id, unset.value.as_str(), unset.enabled), (parameter.id, "14", false));
        assert!(matches!(
            f.service.unset_parameter(action.id, "Missing").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_detail_collects_messages() {
        let f = fixture();
        let job = f.service.create_job(new_job("hello")).await.unwrap();
        let action = f.service.add_action(new_action(job.id, "echo")).await.unwrap();
        f.service.set_parameter(action.id, "Message", "hello").await.unwrap();

        let ExecutionOutcome::Completed { job_run_id, failed } =
            f.engine.execute(job.id).await.unwrap()
        else {
            panic!("expected a completed run");
        };
        assert!(!failed);

        let runs = f.service.job_runs(job.id, 10, 0).await.unwrap();
        assert_eq!(runs.len(), 1);
        let detail = f.service.run_detail(job_run_id).await.unwrap();
        assert_eq!(detail.actions.len(), 1);
        assert_eq!(detail.actions[0].messages[0].message, "hello");
        assert!(f.service.job_runs(job.id, 0, 0).await.is_err());
    }
}
