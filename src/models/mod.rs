mod job;
mod run;

pub use job::{
    Action, ActionParameter, Job, JobDefinition, NewAction, NewActionParameter, NewJob,
    NewSchedule, Schedule, UpdateAction, UpdateActionParameter, UpdateJob, UpdateSchedule,
};
pub use run::{
    ActionRun, JobRun, LogLevel, LogMessage, NewActionRun, NewJobRun, NewLogMessage,
};
