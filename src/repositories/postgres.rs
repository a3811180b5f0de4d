use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_async::AsyncPgConnection;
use diesel_async::RunQueryDsl;
use diesel_async::pooled_connection::bb8::PooledConnection;

use super::JobStore;
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    Action, ActionParameter, ActionRun, Job, JobRun, LogMessage, NewAction, NewActionParameter,
    NewActionRun, NewJob, NewJobRun, NewLogMessage, NewSchedule, Schedule, UpdateAction,
    UpdateActionParameter, UpdateJob, UpdateSchedule,
};
use crate::schema::{action_parameters, action_runs, actions, job_runs, jobs, log_messages, schedules};

/// Maps diesel's `NotFound` to a typed `AppError::NotFound` for `entity`/`id`.
fn or_not_found(entity: &'static str, id: impl ToString) -> impl FnOnce(diesel::result::Error) -> AppError {
    move |e| match e {
        diesel::result::Error::NotFound => AppError::not_found(entity, id),
        _ => AppError::from(e),
    }
}

/// [`JobStore`] backed by PostgreSQL through a bb8 pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: AsyncDbPool,
}

impl PgJobStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> AppResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: NewJob) -> AppResult<Job> {
        let mut conn = self.conn().await?;

        diesel::insert_into(jobs::table)
            .values(&job)
            .returning(Job::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn get_job(&self, id: i32) -> AppResult<Option<Job>> {
        let mut conn = self.conn().await?;

        jobs::table
            .find(id)
            .select(Job::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let mut conn = self.conn().await?;

        jobs::table
            .order(jobs::id.asc())
            .select(Job::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn update_job(&self, id: i32, update: UpdateJob) -> AppResult<Job> {
        let mut conn = self.conn().await?;

        diesel::update(jobs::table.find(id))
            .set((&update, jobs::updated_at.eq(diesel::dsl::now)))
            .returning(Job::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("Job", id))
    }

    async fn delete_job(&self, id: i32) -> AppResult<()> {
        let mut conn = self.conn().await?;

        let deleted = diesel::delete(jobs::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        if deleted == 0 {
            Err(AppError::not_found("Job", id))
        } else {
            Ok(())
        }
    }

    async fn create_schedule(&self, schedule: NewSchedule) -> AppResult<Schedule> {
        let mut conn = self.conn().await?;

        diesel::insert_into(schedules::table)
            .values(&schedule)
            .returning(Schedule::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn get_schedule(&self, id: i32) -> AppResult<Option<Schedule>> {
        let mut conn = self.conn().await?;

        schedules::table
            .find(id)
            .select(Schedule::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn schedules_for_job(&self, job_id: i32) -> AppResult<Vec<Schedule>> {
        let mut conn = self.conn().await?;

        schedules::table
            .filter(schedules::job_id.eq(job_id))
            .order(schedules::id.asc())
            .select(Schedule::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn update_schedule(&self, id: i32, update: UpdateSchedule) -> AppResult<Schedule> {
        let mut conn = self.conn().await?;

        diesel::update(schedules::table.find(id))
            .set(&update)
            .returning(Schedule::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("Schedule", id))
    }

    async fn delete_schedule(&self, id: i32) -> AppResult<Schedule> {
        let mut conn = self.conn().await?;

        diesel::delete(schedules::table.find(id))
            .returning(Schedule::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("Schedule", id))
    }

    async fn create_action(&self, action: NewAction) -> AppResult<Action> {
        let mut conn = self.conn().await?;

        diesel::insert_into(actions::table)
            .values(&action)
            .returning(Action::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn get_action(&self, id: i32) -> AppResult<Option<Action>> {
        let mut conn = self.conn().await?;

        actions::table
            .find(id)
            .select(Action::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn actions_for_job(&self, job_id: i32) -> AppResult<Vec<Action>> {
        let mut conn = self.conn().await?;

        actions::table
            .filter(actions::job_id.eq(job_id))
            .order((actions::position.asc(), actions::id.asc()))
            .select(Action::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn update_action(&self, id: i32, update: UpdateAction) -> AppResult<Action> {
        let mut conn = self.conn().await?;

        diesel::update(actions::table.find(id))
            .set(&update)
            .returning(Action::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("Action", id))
    }

    async fn delete_action(&self, id: i32) -> AppResult<Action> {
        let mut conn = self.conn().await?;

        diesel::delete(actions::table.find(id))
            .returning(Action::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("Action", id))
    }

    async fn create_parameter(&self, parameter: NewActionParameter) -> AppResult<ActionParameter> {
        let mut conn = self.conn().await?;

        diesel::insert_into(action_parameters::table)
            .values(&parameter)
            .returning(ActionParameter::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn get_parameter(&self, id: i32) -> AppResult<Option<ActionParameter>> {
        let mut conn = self.conn().await?;

        action_parameters::table
            .find(id)
            .select(ActionParameter::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn parameters_for_action(&self, action_id: i32) -> AppResult<Vec<ActionParameter>> {
        let mut conn = self.conn().await?;

        action_parameters::table
            .filter(action_parameters::action_id.eq(action_id))
            .order(action_parameters::id.asc())
            .select(ActionParameter::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn update_parameter(
        &self,
        id: i32,
        update: UpdateActionParameter,
    ) -> AppResult<ActionParameter> {
        let mut conn = self.conn().await?;

        diesel::update(action_parameters::table.find(id))
            .set(&update)
            .returning(ActionParameter::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("ActionParameter", id))
    }

    async fn delete_parameter(&self, id: i32) -> AppResult<ActionParameter> {
        let mut conn = self.conn().await?;

        diesel::delete(action_parameters::table.find(id))
            .returning(ActionParameter::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("ActionParameter", id))
    }

    async fn create_job_run(&self, run: NewJobRun) -> AppResult<JobRun> {
        let mut conn = self.conn().await?;

        diesel::insert_into(job_runs::table)
            .values(&run)
            .returning(JobRun::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn finish_job_run(
        &self,
        id: i64,
        ended_at: NaiveDateTime,
        error: bool,
    ) -> AppResult<JobRun> {
        let mut conn = self.conn().await?;

        diesel::update(job_runs::table.find(id))
            .set((job_runs::ended_at.eq(Some(ended_at)), job_runs::error.eq(error)))
            .returning(JobRun::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("JobRun", id))
    }

    async fn get_job_run(&self, id: i64) -> AppResult<Option<JobRun>> {
        let mut conn = self.conn().await?;

        job_runs::table
            .find(id)
            .select(JobRun::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn job_runs(&self, job_id: i32, limit: i64, offset: i64) -> AppResult<Vec<JobRun>> {
        let mut conn = self.conn().await?;

        job_runs::table
            .filter(job_runs::job_id.eq(job_id))
            .order((job_runs::started_at.desc(), job_runs::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(JobRun::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn create_action_run(&self, run: NewActionRun) -> AppResult<ActionRun> {
        let mut conn = self.conn().await?;

        diesel::insert_into(action_runs::table)
            .values(&run)
            .returning(ActionRun::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn finish_action_run(&self, id: i64, ended_at: NaiveDateTime) -> AppResult<ActionRun> {
        let mut conn = self.conn().await?;

        diesel::update(action_runs::table.find(id))
            .set(action_runs::ended_at.eq(Some(ended_at)))
            .returning(ActionRun::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(or_not_found("ActionRun", id))
    }

    async fn action_runs(&self, job_run_id: i64) -> AppResult<Vec<ActionRun>> {
        let mut conn = self.conn().await?;

        action_runs::table
            .filter(action_runs::job_run_id.eq(job_run_id))
            .order((action_runs::ordinal.asc(), action_runs::id.asc()))
            .select(ActionRun::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn append_log_message(&self, message: NewLogMessage) -> AppResult<LogMessage> {
        let mut conn = self.conn().await?;

        diesel::insert_into(log_messages::table)
            .values(&message)
            .returning(LogMessage::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn log_messages(&self, action_run_id: i64) -> AppResult<Vec<LogMessage>> {
        let mut conn = self.conn().await?;

        log_messages::table
            .filter(log_messages::action_run_id.eq(action_run_id))
            .order(log_messages::sequence.asc())
            .select(LogMessage::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn purge_job_runs(&self, before: NaiveDateTime) -> AppResult<usize> {
        let mut conn = self.conn().await?;

        diesel::delete(job_runs::table.filter(job_runs::ended_at.lt(before)))
            .execute(&mut conn)
            .await
            .map_err(AppError::from)
    }
}
