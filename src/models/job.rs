use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{action_parameters, actions, jobs, schedules};

// ============================================================================
// Job
// ============================================================================

/// A named pipeline of actions with a set of weekly schedules
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Job {
    pub id: i32,
    pub name: String,
    pub group_name: String,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub name: String,
    pub group_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, AsChangeset, Deserialize)]
#[diesel(table_name = jobs)]
pub struct UpdateJob {
    pub name: Option<String>,
    pub group_name: Option<String>,
    pub enabled: Option<bool>,
}

impl UpdateJob {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.group_name.is_none() && self.enabled.is_none()
    }

    pub fn apply(&self, job: &mut Job) {
        if let Some(name) = &self.name {
            job.name = name.clone();
        }
        if let Some(group_name) = &self.group_name {
            job.group_name = group_name.clone();
        }
        if let Some(enabled) = self.enabled {
            job.enabled = enabled;
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Weekly recurrence: day flags Sunday..Saturday plus hour and minute
#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Associations, Serialize,
)]
#[diesel(table_name = schedules)]
#[diesel(belongs_to(Job))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Schedule {
    pub id: i32,
    pub job_id: i32,
    pub sunday: bool,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub hour: i32,
    pub minute: i32,
    pub enabled: bool,
}

impl Schedule {
    /// Day flags in Sunday..Saturday order.
    pub fn days(&self) -> [bool; 7] {
        [
            self.sunday,
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
        ]
    }
}

#[derive(Debug, Clone, Default, Insertable, Deserialize)]
#[diesel(table_name = schedules)]
pub struct NewSchedule {
    pub job_id: i32,
    pub sunday: bool,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub hour: i32,
    pub minute: i32,
    pub enabled: bool,
}

impl NewSchedule {
    /// Schedule for `job_id` on the given Sunday..Saturday flags.
    pub fn weekly(job_id: i32, days: [bool; 7], hour: i32, minute: i32) -> Self {
        let [sunday, monday, tuesday, wednesday, thursday, friday, saturday] = days;
        Self {
            job_id,
            sunday,
            monday,
            tuesday,
            wednesday,
            thursday,
            friday,
            saturday,
            hour,
            minute,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset, Deserialize)]
#[diesel(table_name = schedules)]
pub struct UpdateSchedule {
    pub sunday: Option<bool>,
    pub monday: Option<bool>,
    pub tuesday: Option<bool>,
    pub wednesday: Option<bool>,
    pub thursday: Option<bool>,
    pub friday: Option<bool>,
    pub saturday: Option<bool>,
    pub hour: Option<i32>,
    pub minute: Option<i32>,
    pub enabled: Option<bool>,
}

impl UpdateSchedule {
    fn days(&self) -> [Option<bool>; 7] {
        [
            self.sunday,
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.days().iter().all(Option::is_none)
            && self.hour.is_none()
            && self.minute.is_none()
            && self.enabled.is_none()
    }

    pub fn apply(&self, schedule: &mut Schedule) {
        let targets = [
            &mut schedule.sunday,
            &mut schedule.monday,
            &mut schedule.tuesday,
            &mut schedule.wednesday,
            &mut schedule.thursday,
            &mut schedule.friday,
            &mut schedule.saturday,
        ];
        for (target, value) in targets.into_iter().zip(self.days()) {
            if let Some(value) = value {
                *target = value;
            }
        }
        if let Some(hour) = self.hour {
            schedule.hour = hour;
        }
        if let Some(minute) = self.minute {
            schedule.minute = minute;
        }
        if let Some(enabled) = self.enabled {
            schedule.enabled = enabled;
        }
    }
}

// ============================================================================
// Action
// ============================================================================

/// One step of a job pipeline, bound to a command by name
#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Associations, Serialize,
)]
#[diesel(table_name = actions)]
#[diesel(belongs_to(Job))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Action {
    pub id: i32,
    pub job_id: i32,
    pub command_name: String,
    pub position: i32,
    pub enabled: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = actions)]
pub struct NewAction {
    pub job_id: i32,
    pub command_name: String,
    pub position: i32,
    pub enabled: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset, Deserialize)]
#[diesel(table_name = actions)]
pub struct UpdateAction {
    pub command_name: Option<String>,
    pub position: Option<i32>,
    pub enabled: Option<bool>,
    pub description: Option<Option<String>>,
}

impl UpdateAction {
    pub fn is_empty(&self) -> bool {
        self.command_name.is_none()
            && self.position.is_none()
            && self.enabled.is_none()
            && self.description.is_none()
    }

    pub fn apply(&self, action: &mut Action) {
        if let Some(command_name) = &self.command_name {
            action.command_name = command_name.clone();
        }
        if let Some(position) = self.position {
            action.position = position;
        }
        if let Some(enabled) = self.enabled {
            action.enabled = enabled;
        }
        if let Some(description) = &self.description {
            action.description = description.clone();
        }
    }
}

// ============================================================================
// ActionParameter
// ============================================================================

/// Per-action override of a command parameter
#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Associations, Serialize,
)]
#[diesel(table_name = action_parameters)]
#[diesel(belongs_to(Action))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActionParameter {
    pub id: i32,
    pub action_id: i32,
    pub name: String,
    pub value: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = action_parameters)]
pub struct NewActionParameter {
    pub action_id: i32,
    pub name: String,
    pub value: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, AsChangeset, Deserialize)]
#[diesel(table_name = action_parameters)]
pub struct UpdateActionParameter {
    pub name: Option<String>,
    pub value: Option<String>,
    pub enabled: Option<bool>,
}

impl UpdateActionParameter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.value.is_none() && self.enabled.is_none()
    }

    pub fn apply(&self, parameter: &mut ActionParameter) {
        if let Some(name) = &self.name {
            parameter.name = name.clone();
        }
        if let Some(value) = &self.value {
            parameter.value = value.clone();
        }
        if let Some(enabled) = self.enabled {
            parameter.enabled = enabled;
        }
    }
}

/// A job with its children, as loaded at the start of a sync or a run
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub job: Job,
    pub schedules: Vec<Schedule>,
    /// Ordered by position, then id
    pub actions: Vec<(Action, Vec<ActionParameter>)>,
}
