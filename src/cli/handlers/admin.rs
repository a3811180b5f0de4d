//! Job administration command handlers
//!
//! Thin wrappers over [`JobService`](crate::services::JobService); every
//! mutation resynchronizes the affected job's triggers in this process.

use crate::cli::parser::{ActionCommands, JobCommands, ParamCommands, ScheduleCommands};
use crate::commands::Command;
use crate::error::AppResult;
use crate::jobs::Recurrence;
use crate::jobs::recurrence::DAY_NAMES;
use crate::models::{
    Job, JobDefinition, NewAction, NewJob, NewSchedule, Schedule, UpdateAction, UpdateJob,
    UpdateSchedule,
};
use crate::state::AppState;

pub struct AdminCommandHandler {
    state: AppState,
}

impl AdminCommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn job(&self, command: &JobCommands) -> AppResult<()> {
        let jobs = &self.state.jobs;
        match command {
            JobCommands::List => print!("{}", render_jobs(&jobs.list_jobs().await?)),
            JobCommands::Show { job_id } => {
                print!("{}", render_definition(&jobs.get_definition(*job_id).await?));
            }
            JobCommands::Create {
                name,
                group,
                disabled,
            } => {
                let job = jobs
                    .create_job(NewJob {
                        name: name.clone(),
                        group_name: group.clone(),
                        enabled: !disabled,
                    })
                    .await?;
                println!("Created job {} ({})", job.id, job.name);
            }
            JobCommands::Update {
                job_id,
                name,
                group,
            } => {
                let job = jobs
                    .update_job(*job_id, UpdateJob {
                        name: name.clone(),
                        group_name: group.clone(),
                        enabled: None,
                    })
                    .await?;
                println!("Updated job {} ({}, group {})", job.id, job.name, job.group_name);
            }
            JobCommands::Delete { job_id } => {
                jobs.delete_job(*job_id).await?;
                println!("Deleted job {}", job_id);
            }
            JobCommands::Enable { job_id } => {
                jobs.set_job_enabled(*job_id, true).await?;
                println!("Enabled job {}", job_id);
            }
            JobCommands::Disable { job_id } => {
                jobs.set_job_enabled(*job_id, false).await?;
                println!("Disabled job {}", job_id);
            }
        }
        Ok(())
    }

    pub async fn schedule(&self, command: &ScheduleCommands) -> AppResult<()> {
        let jobs = &self.state.jobs;
        match command {
            ScheduleCommands::Add {
                job_id,
                recurrence,
                disabled,
            } => {
                let (hour, minute) = recurrence.at;
                let mut schedule = NewSchedule::weekly(*job_id, recurrence.days, hour, minute);
                schedule.enabled = !disabled;
                let schedule = jobs.add_schedule(schedule).await?;
                println!(
                    "Created schedule {} for job {}: {}",
                    schedule.id,
                    job_id,
                    describe_schedule(&schedule)
                );
            }
            ScheduleCommands::Enable { schedule_id } | ScheduleCommands::Disable { schedule_id } => {
                let enabled = matches!(command, ScheduleCommands::Enable { .. });
                jobs.update_schedule(*schedule_id, UpdateSchedule {
                    enabled: Some(enabled),
                    ..Default::default()
                })
                .await?;
                println!(
                    "{} schedule {}",
                    if enabled { "Enabled" } else { "Disabled" },
                    schedule_id
                );
            }
            ScheduleCommands::Remove { schedule_id } => {
                let schedule = jobs.delete_schedule(*schedule_id).await?;
                println!("Removed schedule {} from job {}", schedule.id, schedule.job_id);
            }
        }
        Ok(())
    }

    pub async fn action(&self, command: &ActionCommands) -> AppResult<()> {
        let jobs = &self.state.jobs;
        match command {
            ActionCommands::Add {
                job_id,
                command,
                position,
                description,
            } => {
                let position = match position {
                    Some(position) => *position,
                    None => next_position(&jobs.get_definition(*job_id).await?),
                };
                let action = jobs
                    .add_action(NewAction {
                        job_id: *job_id,
                        command_name: command.clone(),
                        position,
                        enabled: true,
                        description: description.clone(),
                    })
                    .await?;
                println!(
                    "Created action {} ({}) at position {} of job {}",
                    action.id, action.command_name, action.position, job_id
                );
            }
            ActionCommands::Rebind { action_id, command } => {
                let action = jobs
                    .update_action(*action_id, UpdateAction {
                        command_name: Some(command.clone()),
                        ..Default::default()
                    })
                    .await?;
                println!("Action {} now runs {}", action.id, action.command_name);
            }
            ActionCommands::Move {
                action_id,
                position,
            } => {
                jobs.update_action(*action_id, UpdateAction {
                    position: Some(*position),
                    ..Default::default()
                })
                .await?;
                println!("Moved action {} to position {}", action_id, position);
            }
            ActionCommands::Enable { action_id } | ActionCommands::Disable { action_id } => {
                let enabled = matches!(command, ActionCommands::Enable { .. });
                jobs.update_action(*action_id, UpdateAction {
                    enabled: Some(enabled),
                    ..Default::default()
                })
                .await?;
                println!(
                    "{} action {}",
                    if enabled { "Enabled" } else { "Disabled" },
                    action_id
                );
            }
            ActionCommands::Remove { action_id } => {
                let action = jobs.delete_action(*action_id).await?;
                println!("Removed action {} from job {}", action.id, action.job_id);
            }
        }
        Ok(())
    }

    pub async fn param(&self, command: &ParamCommands) -> AppResult<()> {
        let jobs = &self.state.jobs;
        match command {
            ParamCommands::Set {
                action_id,
                name,
                value,
            } => {
                let parameter = jobs.set_parameter(*action_id, name, value).await?;
                println!("{} = {:?} on action {}", parameter.name, parameter.value, action_id);
            }
            ParamCommands::Unset { action_id, name } => {
                let parameter = jobs.unset_parameter(*action_id, name).await?;
                println!("{} no longer overridden on action {}", parameter.name, action_id);
            }
        }
        Ok(())
    }

    pub fn list_commands(&self) {
        print!("{}", render_commands(&self.state.engine.registry().commands()));
    }
}

fn next_position(definition: &JobDefinition) -> i32 {
    definition
        .actions
        .iter()
        .map(|(action, _)| action.position + 1)
        .max()
        .unwrap_or(0)
}

fn describe_schedule(schedule: &Schedule) -> String {
    let days: Vec<&str> = DAY_NAMES
        .iter()
        .zip(schedule.days())
        .filter_map(|(name, on)| on.then_some(*name))
        .collect();
    let days = match days.len() {
        0 => "no days".to_string(),
        7 => "daily".to_string(),
        _ => days.join(","),
    };
    format!(
        "{} at {:02}:{:02} [{}]",
        days,
        schedule.hour,
        schedule.minute,
        Recurrence::from(schedule).encode()
    )
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

fn render_jobs(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No jobs defined\n".to_string();
    }

    let mut out = format!("{:<6} {:<24} {:<16} {}\n", "ID", "NAME", "GROUP", "STATE");
    for job in jobs {
        out.push_str(&format!(
            "{:<6} {:<24} {:<16} {}\n",
            job.id,
            job.name,
            job.group_name,
            enabled_label(job.enabled)
        ));
    }
    out
}

fn render_definition(definition: &JobDefinition) -> String {
    let job = &definition.job;
    let mut out = format!(
        "Job {}: {} (group {}, {})\n",
        job.id,
        job.name,
        job.group_name,
        enabled_label(job.enabled)
    );

    out.push_str("Schedules:\n");
    if definition.schedules.is_empty() {
        out.push_str("  none\n");
    }
    for schedule in &definition.schedules {
        out.push_str(&format!(
            "  #{} {} ({})\n",
            schedule.id,
            describe_schedule(schedule),
            enabled_label(schedule.enabled)
        ));
    }

    out.push_str("Actions:\n");
    if definition.actions.is_empty() {
        out.push_str("  none\n");
    }
    for (action, parameters) in &definition.actions {
        out.push_str(&format!(
            "  #{} [{}] {} ({})",
            action.id,
            action.position,
            action.command_name,
            enabled_label(action.enabled)
        ));
        if let Some(description) = &action.description {
            out.push_str(&format!(": {}", description));
        }
        out.push('\n');
        for parameter in parameters {
            let source = if parameter.enabled { "override" } else { "unset" };
            out.push_str(&format!(
                "      {} = {:?} ({})\n",
                parameter.name, parameter.value, source
            ));
        }
    }
    out
}

fn render_commands(commands: &[std::sync::Arc<dyn Command>]) -> String {
    let mut out = String::new();
    for command in commands {
        out.push_str(&format!("{}: {}\n", command.name(), command.description()));
        for spec in command.parameters() {
            let mut line = format!("    {} ({})", spec.name, spec.kind);
            if let (Some(min), Some(max)) = (spec.min, spec.max) {
                line.push_str(&format!(" {}..{}", min, max));
            }
            if !spec.options.is_empty() {
                line.push_str(&format!(" one of {}", spec.options.join("|")));
            }
            if let Some(default) = &spec.default {
                line.push_str(&format!(" default {:?}", default));
            }
            if !spec.description.is_empty() {
                line.push_str(&format!(" - {}", spec.description));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parser::RecurrenceArgs;
    use crate::config::Settings;
    use crate::error::AppError;

    async fn handler() -> (AdminCommandHandler, AppState) {
        let state = AppState::initialize(Settings::default()).await.unwrap();
        (AdminCommandHandler::new(state.clone()), state)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_define_job_end_to_end() {
        let (admin, state) = handler().await;

        admin
            .job(&JobCommands::Create {
                name: "backup".to_string(),
                group: "ops".to_string(),
                disabled: false,
            })
            .await
            .unwrap();
        let job_id = state.jobs.list_jobs().await.unwrap()[0].id;

        admin
            .schedule(&ScheduleCommands::Add {
                job_id,
                recurrence: RecurrenceArgs {
                    days: [false, true, false, false, false, true, false],
                    at: (6, 15),
                },
                disabled: false,
            })
            .await
            .unwrap();
        for command in ["echo", "shell"] {
            admin
                .action(&ActionCommands::Add {
                    job_id,
                    command: command.to_string(),
                    position: None,
                    description: None,
                })
                .await
                .unwrap();
        }

        let definition = state.jobs.get_definition(job_id).await.unwrap();
        let positions: Vec<i32> = definition.actions.iter().map(|(a, _)| a.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(
            state.engine.live_state().await.unwrap()[&job_id]
                .values()
                .cloned()
                .collect::<Vec<_>>(),
            vec!["0615NYNNNYN".to_string()]
        );

        let echo_id = definition.actions[0].0.id;
        admin
            .param(&ParamCommands::Set {
                action_id: echo_id,
                name: "message".to_string(),
                value: "hello".to_string(),
            })
            .await
            .unwrap();
        let rendered = render_definition(&state.jobs.get_definition(job_id).await.unwrap());
        assert!(rendered.contains("Mon,Fri at 06:15 [0615NYNNNYN] (enabled)"));
        assert!(rendered.contains("Message = \"hello\" (override)"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_command_is_rejected() {
        let (admin, state) = handler().await;
        let job = state
            .jobs
            .create_job(NewJob {
                name: "x".to_string(),
                group_name: "default".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        let err = admin
            .action(&ActionCommands::Add {
                job_id: job.id,
                command: "teleport".to_string(),
                position: None,
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "command_name"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disable_schedule_removes_trigger() {
        let (admin, state) = handler().await;
        let job = state
            .jobs
            .create_job(NewJob {
                name: "x".to_string(),
                group_name: "default".to_string(),
                enabled: true,
            })
            .await
            .unwrap();
        let schedule = state
            .jobs
            .add_schedule(NewSchedule::weekly(job.id, [true; 7], 0, 0))
            .await
            .unwrap();
        assert!(state.engine.live_state().await.unwrap().contains_key(&job.id));

        admin
            .schedule(&ScheduleCommands::Disable {
                schedule_id: schedule.id,
            })
            .await
            .unwrap();
        assert!(state.engine.live_state().await.unwrap().is_empty());
    }

    #[test]
    fn test_render_jobs_and_commands() {
        assert_eq!(render_jobs(&[]), "No jobs defined\n");

        let registry = crate::commands::CommandRegistry::with_builtins();
        let rendered = render_commands(&registry.commands());
        assert!(rendered.contains("PurgeHistory: "));
        assert!(rendered.contains("    RetentionDays (int) 1..3650 default \"30\""));
    }
}
