//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::build;

/// Weekly job scheduler with persisted run history
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Weekly job scheduler with persisted run history")]
#[command(long_about = "
Cadence runs named jobs on weekly schedules. A job is an ordered pipeline of
actions; each action invokes a registered command with its parameters. Every
execution is recorded as a job run with per-action log messages.

EXAMPLES:
    # Synchronize every job and run the scheduler until Ctrl-C
    cadence serve

    # Check configuration without starting the scheduler
    cadence serve --dry-run

    # Run job 3 now and print the outcome
    cadence run 3

    # Show the last 5 runs of job 3 as JSON
    cadence history 3 --limit 5 --json

    # Define a job that runs on weekdays at 06:15
    cadence job create backup --group ops
    cadence schedule add 1 --days mon,tue,wed,thu,fri --at 06:15
    cadence action add 1 shell
    cadence param set 1 Command \"pg_dump app > /srv/backup/app.sql\"

    # Apply database migrations
    cadence migrate

For more information about configuration options, see config/default.toml.
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Use a single TOML file instead of the layered config/ directory.
    /// Environment variables prefixed with CADENCE_ still apply on top.
    /// The file must exist and be readable.
    ///
    /// Example: --config /etc/cadence/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects which config/{environment}.toml layer is loaded.
    /// Defaults to CADENCE_APP_ENV, or development when unset.
    ///
    /// Available values: development (dev), test, staging (stage), production (prod)
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    ///
    /// Increases log output to debug level.
    /// Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    ///
    /// Reduces log output to error level only.
    /// Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until interrupted (default)
    ///
    /// Synchronizes the live triggers of every job, starts the scheduler and
    /// waits for Ctrl-C or SIGTERM. While running, all jobs are resynchronized
    /// every scheduler.resync_interval_secs seconds.
    ///
    /// Examples:
    ///   cadence serve                 # Start with defaults
    ///   cadence serve --workers 4     # Run at most 4 jobs at the same time
    ///   cadence serve --dry-run       # Validate config without starting
    Serve {
        /// Maximum number of jobs executing at the same time
        ///
        /// Overrides scheduler.worker_threads.
        #[arg(short, long, value_name = "COUNT", value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,

        /// Log level override
        ///
        /// Overrides both configuration file settings and global --verbose/--quiet flags.
        ///
        /// Available levels: error, warn, info, debug, trace
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        ///
        /// Returns exit code 0 if valid, non-zero if invalid.
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute a job now
    ///
    /// Uses the same path as a scheduled fire: if the job is already running
    /// in this process the request is dropped.
    ///
    /// Example:
    ///   cadence run 3
    Run {
        /// Id of the job to execute
        #[arg(value_name = "JOB_ID")]
        job_id: i32,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile live triggers with persisted schedules
    ///
    /// With a job id only that job is synchronized; otherwise every persisted
    /// job and every job with live triggers.
    Sync {
        /// Id of the job to synchronize
        #[arg(value_name = "JOB_ID")]
        job_id: Option<i32>,
    },

    /// Show the run history of a job
    ///
    /// Examples:
    ///   cadence history 3                  # Last 20 runs
    ///   cadence history 3 --run 120        # Action runs and messages of run 120
    History {
        /// Id of the job
        #[arg(value_name = "JOB_ID")]
        job_id: i32,

        /// Number of runs to show, newest first
        #[arg(short, long, default_value_t = 20, value_parser = super::validation::validate_history_limit)]
        limit: i64,

        /// Show the action runs and log messages of one run instead
        #[arg(long, value_name = "RUN_ID")]
        run: Option<i64>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage job definitions
    #[command(subcommand)]
    Job(JobCommands),

    /// Manage weekly schedules
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Manage the actions of a job
    #[command(subcommand)]
    Action(ActionCommands),

    /// Manage action parameter overrides
    #[command(subcommand)]
    Param(ParamCommands),

    /// List the registered commands and their parameters
    #[command(name = "commands")]
    ListCommands,

    /// Database migration operations
    ///
    /// Examples:
    ///   cadence migrate                    # Apply all pending migrations
    ///   cadence migrate --dry-run          # Show pending migrations without applying
    ///   cadence migrate --rollback 1       # Rollback the last migration
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback
        ///
        /// Must be between 1 and 100.
        /// Cannot be used with --dry-run.
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// List every job
    List,
    /// Show a job with its schedules, actions and parameters
    Show { job_id: i32 },
    /// Create a job
    Create {
        name: String,
        #[arg(short, long, default_value = "default")]
        group: String,
        /// Create the job disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Rename a job or move it to another group
    Update {
        job_id: i32,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Delete a job and its definition; run history is kept
    Delete { job_id: i32 },
    Enable { job_id: i32 },
    Disable { job_id: i32 },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Add a weekly schedule to a job
    Add {
        job_id: i32,
        #[command(flatten)]
        recurrence: RecurrenceArgs,
        /// Create the schedule disabled
        #[arg(long)]
        disabled: bool,
    },
    Enable { schedule_id: i32 },
    Disable { schedule_id: i32 },
    Remove { schedule_id: i32 },
}

#[derive(Args, Debug)]
pub struct RecurrenceArgs {
    /// Comma separated days: sun,mon,tue,wed,thu,fri,sat or "daily"
    #[arg(long, value_name = "DAYS", value_parser = super::validation::parse_days)]
    pub days: [bool; 7],

    /// Time of day as HH:MM, UTC
    #[arg(long, value_name = "HH:MM", value_parser = super::validation::parse_time_of_day)]
    pub at: (i32, i32),
}

#[derive(Subcommand, Debug)]
pub enum ActionCommands {
    /// Append an action running COMMAND to a job
    Add {
        job_id: i32,
        command: String,
        /// Position in the pipeline; defaults to after the last action
        #[arg(long)]
        position: Option<i32>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Bind an action to another command, reconciling its parameters
    Rebind { action_id: i32, command: String },
    Move { action_id: i32, position: i32 },
    Enable { action_id: i32 },
    Disable { action_id: i32 },
    Remove { action_id: i32 },
}

#[derive(Subcommand, Debug)]
pub enum ParamCommands {
    /// Set and enable a parameter override
    Set {
        action_id: i32,
        name: String,
        value: String,
    },
    /// Stop overriding a parameter; the configured default applies again
    Unset { action_id: i32, name: String },
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

/// Log level options
#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Cli {
    /// Checks argument combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Migrate { dry_run, rollback }) = &self.command
            && *dry_run
            && rollback.is_some()
        {
            return Err("Cannot use --dry-run and --rollback together".to_string());
        }

        if let Some(Commands::Job(JobCommands::Update { name, group, .. })) = &self.command
            && name.is_none()
            && group.is_none()
        {
            return Err("job update needs --name or --group".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }

        Ok(())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Trace => "trace".to_string(),
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Test => crate::config::Environment::Test,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
        }
    }
}
