use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

use crate::schema::{action_runs, job_runs, log_messages};

/// Severity of a persisted log message
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, DbEnum,
)]
#[db_enum(existing_type_path = "crate::schema::sql_types::LogLevel")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

// ============================================================================
// JobRun
// ============================================================================

/// One execution of a job; `job_id` and `job_name` are snapshots
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = job_runs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobRun {
    pub id: i64,
    pub job_id: i32,
    pub job_name: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub error: bool,
}

impl JobRun {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = job_runs)]
pub struct NewJobRun {
    pub job_id: i32,
    pub job_name: String,
    pub started_at: NaiveDateTime,
}

// ============================================================================
// ActionRun
// ============================================================================

/// One action attempt within a job run
#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Associations, Serialize,
)]
#[diesel(table_name = action_runs)]
#[diesel(belongs_to(JobRun))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActionRun {
    pub id: i64,
    pub job_run_id: i64,
    pub action_id: i32,
    pub command_name: String,
    pub ordinal: i32,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = action_runs)]
pub struct NewActionRun {
    pub job_run_id: i64,
    pub action_id: i32,
    pub command_name: String,
    pub ordinal: i32,
    pub started_at: NaiveDateTime,
}

// ============================================================================
// LogMessage
// ============================================================================

#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Associations, Serialize,
)]
#[diesel(table_name = log_messages)]
#[diesel(belongs_to(ActionRun))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LogMessage {
    pub id: i64,
    pub action_run_id: i64,
    pub sequence: i32,
    pub level: LogLevel,
    pub logged_at: NaiveDateTime,
    pub message: String,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = log_messages)]
pub struct NewLogMessage {
    pub action_run_id: i64,
    pub sequence: i32,
    pub level: LogLevel,
    pub logged_at: NaiveDateTime,
    pub message: String,
    pub error_detail: Option<String>,
}
