//! Pluggable commands that actions bind to by name.

pub mod builtin;
mod defaults;
mod parameters;
mod registry;

pub use defaults::{ConfigDefaults, SettingsDefaults};
pub use parameters::{ParameterKind, ParameterMap, ParameterSpec};
pub use registry::CommandRegistry;

use std::sync::Arc;

use async_trait::async_trait;

use crate::jobs::LogSink;
use crate::repositories::JobStore;

/// Everything a command sees while it runs
pub struct CommandContext<'a> {
    pub params: &'a ParameterMap,
    pub log: &'a dyn LogSink,
    pub store: Arc<dyn JobStore>,
    pub job_id: i32,
    pub job_run_id: i64,
}

/// Named executable unit with a declared parameter schema.
///
/// An `Err` or a panic from `execute` is caught by the action runner and
/// recorded against the action run; it never reaches the scheduler.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()>;
}

/// Finds the declared parameter named `name`, ignoring case.
pub fn find_parameter<'a>(specs: &'a [ParameterSpec], name: &str) -> Option<&'a ParameterSpec> {
    specs.iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
}
