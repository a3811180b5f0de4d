use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::RwLock;

use super::JobStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Action, ActionParameter, ActionRun, Job, JobRun, LogMessage, NewAction, NewActionParameter,
    NewActionRun, NewJob, NewJobRun, NewLogMessage, NewSchedule, Schedule, UpdateAction,
    UpdateActionParameter, UpdateJob, UpdateSchedule,
};

/// Mirrors a postgres foreign-key violation as converted by `DatabaseErrorConverter`.
fn invalid_reference(entity: &str, field: &str) -> AppError {
    AppError::validation(field, format!("Invalid reference from {}", entity))
}

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).cloned()
    }
}

#[derive(Default)]
struct State {
    jobs: Table<Job>,
    schedules: Table<Schedule>,
    actions: Table<Action>,
    parameters: Table<ActionParameter>,
    job_runs: Table<JobRun>,
    action_runs: Table<ActionRun>,
    log_messages: Table<LogMessage>,
    /// (action run id, sequence) -> log message id
    log_sequences: BTreeMap<(i64, i32), i64>,
}

impl State {
    fn remove_action_cascade(&mut self, action_id: i32) -> Option<Action> {
        let removed = self.actions.rows.remove(&(action_id as i64))?;
        self.parameters.rows.retain(|_, p| p.action_id != action_id);
        Some(removed)
    }

    fn remove_job_run_cascade(&mut self, job_run_id: i64) {
        self.job_runs.rows.remove(&job_run_id);
        let action_run_ids: Vec<i64> = self
            .action_runs
            .rows
            .values()
            .filter(|r| r.job_run_id == job_run_id)
            .map(|r| r.id)
            .collect();
        for id in &action_run_ids {
            self.action_runs.rows.remove(id);
        }
        for action_run_id in action_run_ids {
            let keys: Vec<(i64, i32)> = self
                .log_sequences
                .range((action_run_id, i32::MIN)..=(action_run_id, i32::MAX))
                .map(|(key, _)| *key)
                .collect();
            for key in keys {
                if let Some(id) = self.log_sequences.remove(&key) {
                    self.log_messages.rows.remove(&id);
                }
            }
        }
    }

    fn messages_for(&self, action_run_id: i64) -> impl Iterator<Item = &LogMessage> {
        self.log_sequences
            .range((action_run_id, i32::MIN)..=(action_run_id, i32::MAX))
            .filter_map(|(_, id)| self.log_messages.rows.get(id))
    }
}

/// Process-local store used when `database.url = "memory"`. Starts empty and
/// loses everything on exit.
#[derive(Default)]
pub struct MemoryJobStore {
    state: RwLock<State>,
    #[cfg(test)]
    failing_log_writes: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` log message writes fail.
    #[cfg(test)]
    pub(crate) fn fail_next_log_writes(&self, count: usize) {
        self.failing_log_writes.store(count, Ordering::SeqCst);
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: NewJob) -> AppResult<Job> {
        let mut state = self.state.write().await;
        let id = state.jobs.allocate();
        let created = Job {
            id: id as i32,
            name: job.name,
            group_name: job.group_name,
            enabled: job.enabled,
            created_at: now(),
            updated_at: now(),
        };
        state.jobs.rows.insert(id, created.clone());
        Ok(created)
    }

    async fn get_job(&self, id: i32) -> AppResult<Option<Job>> {
        Ok(self.state.read().await.jobs.get(id as i64))
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        Ok(self.state.read().await.jobs.rows.values().cloned().collect())
    }

    async fn update_job(&self, id: i32, update: UpdateJob) -> AppResult<Job> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .rows
            .get_mut(&(id as i64))
            .ok_or_else(|| AppError::not_found("Job", id))?;
        update.apply(job);
        job.updated_at = now();
        Ok(job.clone())
    }

    async fn delete_job(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .jobs
            .rows
            .remove(&(id as i64))
            .ok_or_else(|| AppError::not_found("Job", id))?;

        state.schedules.rows.retain(|_, s| s.job_id != id);
        let action_ids: Vec<i32> = state
            .actions
            .rows
            .values()
            .filter(|a| a.job_id == id)
            .map(|a| a.id)
            .collect();
        for action_id in action_ids {
            state.remove_action_cascade(action_id);
        }
        Ok(())
    }

    async fn create_schedule(&self, schedule: NewSchedule) -> AppResult<Schedule> {
        let mut state = self.state.write().await;
        if !state.jobs.rows.contains_key(&(schedule.job_id as i64)) {
            return Err(invalid_reference("schedules", "job_id"));
        }
        let id = state.schedules.allocate();
        let created = Schedule {
            id: id as i32,
            job_id: schedule.job_id,
            sunday: schedule.sunday,
            monday: schedule.monday,
            tuesday: schedule.tuesday,
            wednesday: schedule.wednesday,
            thursday: schedule.thursday,
            friday: schedule.friday,
            saturday: schedule.saturday,
            hour: schedule.hour,
            minute: schedule.minute,
            enabled: schedule.enabled,
        };
        state.schedules.rows.insert(id, created.clone());
        Ok(created)
    }

    async fn get_schedule(&self, id: i32) -> AppResult<Option<Schedule>> {
        Ok(self.state.read().await.schedules.get(id as i64))
    }

    async fn schedules_for_job(&self, job_id: i32) -> AppResult<Vec<Schedule>> {
        let state = self.state.read().await;
        Ok(state
            .schedules
            .rows
            .values()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn update_schedule(&self, id: i32, update: UpdateSchedule) -> AppResult<Schedule> {
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .rows
            .get_mut(&(id as i64))
            .ok_or_else(|| AppError::not_found("Schedule", id))?;
        update.apply(schedule);
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, id: i32) -> AppResult<Schedule> {
        self.state
            .write()
            .await
            .schedules
            .rows
            .remove(&(id as i64))
            .ok_or_else(|| AppError::not_found("Schedule", id))
    }

    async fn create_action(&self, action: NewAction) -> AppResult<Action> {
        let mut state = self.state.write().await;
        if !state.jobs.rows.contains_key(&(action.job_id as i64)) {
            return Err(invalid_reference("actions", "job_id"));
        }
        let id = state.actions.allocate();
        let created = Action {
            id: id as i32,
            job_id: action.job_id,
            command_name: action.command_name,
            position: action.position,
            enabled: action.enabled,
            description: action.description,
        };
        state.actions.rows.insert(id, created.clone());
        Ok(created)
    }

    async fn get_action(&self, id: i32) -> AppResult<Option<Action>> {
        Ok(self.state.read().await.actions.get(id as i64))
    }

    async fn actions_for_job(&self, job_id: i32) -> AppResult<Vec<Action>> {
        let state = self.state.read().await;
        let mut actions: Vec<Action> = state
            .actions
            .rows
            .values()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect();
        actions.sort_by_key(|a| (a.position, a.id));
        Ok(actions)
    }

    async fn update_action(&self, id: i32, update: UpdateAction) -> AppResult<Action> {
        let mut state = self.state.write().await;
        let action = state
            .actions
            .rows
            .get_mut(&(id as i64))
            .ok_or_else(|| AppError::not_found("Action", id))?;
        update.apply(action);
        Ok(action.clone())
    }

    async fn delete_action(&self, id: i32) -> AppResult<Action> {
        self.state
            .write()
            .await
            .remove_action_cascade(id)
            .ok_or_else(|| AppError::not_found("Action", id))
    }

    async fn create_parameter(&self, parameter: NewActionParameter) -> AppResult<ActionParameter> {
        let mut state = self.state.write().await;
        if !state.actions.rows.contains_key(&(parameter.action_id as i64)) {
            return Err(invalid_reference("action_parameters", "action_id"));
        }
        let id = state.parameters.allocate();
        let created = ActionParameter {
            id: id as i32,
            action_id: parameter.action_id,
            name: parameter.name,
            value: parameter.value,
            enabled: parameter.enabled,
        };
        state.parameters.rows.insert(id, created.clone());
        Ok(created)
    }

    async fn get_parameter(&self, id: i32) -> AppResult<Option<ActionParameter>> {
        Ok(self.state.read().await.parameters.get(id as i64))
    }

    async fn parameters_for_action(&self, action_id: i32) -> AppResult<Vec<ActionParameter>> {
        let state = self.state.read().await;
        Ok(state
            .parameters
            .rows
            .values()
            .filter(|p| p.action_id == action_id)
            .cloned()
            .collect())
    }

    async fn update_parameter(
        &self,
        id: i32,
        update: UpdateActionParameter,
    ) -> AppResult<ActionParameter> {
        let mut state = self.state.write().await;
        let parameter = state
            .parameters
            .rows
            .get_mut(&(id as i64))
            .ok_or_else(|| AppError::not_found("ActionParameter", id))?;
        update.apply(parameter);
        Ok(parameter.clone())
    }

    async fn delete_parameter(&self, id: i32) -> AppResult<ActionParameter> {
        self.state
            .write()
            .await
            .parameters
            .rows
            .remove(&(id as i64))
            .ok_or_else(|| AppError::not_found("ActionParameter", id))
    }

    async fn create_job_run(&self, run: NewJobRun) -> AppResult<JobRun> {
        let mut state = self.state.write().await;
        let id = state.job_runs.allocate();
        let created = JobRun {
            id,
            job_id: run.job_id,
            job_name: run.job_name,
            started_at: run.started_at,
            ended_at: None,
            error: false,
        };
        state.job_runs.rows.insert(id, created.clone());
        Ok(created)
    }

    async fn finish_job_run(
        &self,
        id: i64,
        ended_at: NaiveDateTime,
        error: bool,
    ) -> AppResult<JobRun> {
        let mut state = self.state.write().await;
        let run = state
            .job_runs
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("JobRun", id))?;
        run.ended_at = Some(ended_at);
        run.error = error;
        Ok(run.clone())
    }

    async fn get_job_run(&self, id: i64) -> AppResult<Option<JobRun>> {
        Ok(self.state.read().await.job_runs.get(id))
    }

    async fn job_runs(&self, job_id: i32, limit: i64, offset: i64) -> AppResult<Vec<JobRun>> {
        let state = self.state.read().await;
        Ok(state
            .job_runs
            .rows
            .values()
            .rev()
            .filter(|r| r.job_id == job_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_action_run(&self, run: NewActionRun) -> AppResult<ActionRun> {
        let mut state = self.state.write().await;
        if !state.job_runs.rows.contains_key(&run.job_run_id) {
            return Err(invalid_reference("action_runs", "job_run_id"));
        }
        let id = state.action_runs.allocate();
        let created = ActionRun {
            id,
            job_run_id: run.job_run_id,
            action_id: run.action_id,
            command_name: run.command_name,
            ordinal: run.ordinal,
            started_at: run.started_at,
            ended_at: None,
        };
        state.action_runs.rows.insert(id, created.clone());
        Ok(created)
    }

    async fn finish_action_run(&self, id: i64, ended_at: NaiveDateTime) -> AppResult<ActionRun> {
        let mut state = self.state.write().await;
        let run = state
            .action_runs
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("ActionRun", id))?;
        run.ended_at = Some(ended_at);
        Ok(run.clone())
    }

    async fn action_runs(&self, job_run_id: i64) -> AppResult<Vec<ActionRun>> {
        let state = self.state.read().await;
        let mut runs: Vec<ActionRun> = state
            .action_runs
            .rows
            .values()
            .filter(|r| r.job_run_id == job_run_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| (r.ordinal, r.id));
        Ok(runs)
    }

    async fn append_log_message(&self, message: NewLogMessage) -> AppResult<LogMessage> {
        #[cfg(test)]
        if self
            .failing_log_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::Database {
                operation: "append log message".to_string(),
                source: anyhow::anyhow!("injected write failure"),
            });
        }

        let mut state = self.state.write().await;
        if !state.action_runs.rows.contains_key(&message.action_run_id) {
            return Err(invalid_reference("log_messages", "action_run_id"));
        }
        let key = (message.action_run_id, message.sequence);
        if state.log_sequences.contains_key(&key) {
            return Err(AppError::Duplicate {
                entity: "log_messages".to_string(),
                field: "sequence".to_string(),
                value: message.sequence.to_string(),
            });
        }

        let id = state.log_messages.allocate();
        let created = LogMessage {
            id,
            action_run_id: message.action_run_id,
            sequence: message.sequence,
            level: message.level,
            logged_at: message.logged_at,
            message: message.message,
            error_detail: message.error_detail,
        };
        state.log_messages.rows.insert(id, created.clone());
        state.log_sequences.insert(key, id);
        Ok(created)
    }

    async fn log_messages(&self, action_run_id: i64) -> AppResult<Vec<LogMessage>> {
        let state = self.state.read().await;
        Ok(state.messages_for(action_run_id).cloned().collect())
    }

    async fn purge_job_runs(&self, before: NaiveDateTime) -> AppResult<usize> {
        let mut state = self.state.write().await;
        let expired: Vec<i64> = state
            .job_runs
            .rows
            .values()
            .filter(|r| r.ended_at.is_some_and(|ended| ended < before))
            .map(|r| r.id)
            .collect();
        for id in &expired {
            state.remove_job_run_cascade(*id);
        }
        Ok(expired.len())
    }
}
