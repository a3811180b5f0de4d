use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;

use crate::commands::{Command, CommandContext, CommandRegistry, ConfigDefaults, ParameterMap};
use crate::error::{AppError, AppResult};
use crate::jobs::log_sink::{LogSink, StoreLogSink};
use crate::models::{Action, ActionParameter, NewActionRun};
use crate::repositories::JobStore;

/// An action with its command resolved and parameters merged, fixed when
/// the job run starts.
#[derive(Clone)]
pub struct PreparedAction {
    pub action: Action,
    pub command: Option<Arc<dyn Command>>,
    pub params: ParameterMap,
}

impl std::fmt::Debug for PreparedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedAction")
            .field("action", &self.action)
            .field("command", &self.command.as_ref().map(|c| c.name()))
            .field("params", &self.params)
            .finish()
    }
}

/// Runs a single action and records its `ActionRun` and log messages.
pub struct ActionRunner {
    store: Arc<dyn JobStore>,
    registry: Arc<CommandRegistry>,
    defaults: Arc<dyn ConfigDefaults>,
}

impl ActionRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<CommandRegistry>,
        defaults: Arc<dyn ConfigDefaults>,
    ) -> Self {
        Self {
            store,
            registry,
            defaults,
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Resolves the command and merges parameters: declared defaults, then
    /// configuration defaults, then the action's enabled overrides.
    pub fn prepare(&self, action: &Action, overrides: &[ActionParameter]) -> PreparedAction {
        let command = self.registry.resolve(&action.command_name);
        let mut params = ParameterMap::new();

        if let Some(command) = &command {
            for spec in command.parameters() {
                if let Some(default) = spec.default {
                    params.insert(&spec.name, default);
                } else {
                    // Reserve the declared casing for later layers.
                    params.insert(&spec.name, String::new());
                }
            }
            for (name, value) in self.defaults.values_with_prefix(command.name()) {
                params.insert(&name, value);
            }
        }

        for parameter in overrides.iter().filter(|p| p.enabled) {
            params.insert(&parameter.name, parameter.value.clone());
        }

        PreparedAction {
            action: action.clone(),
            command,
            params,
        }
    }

    /// Runs `prepared` as step `ordinal` of `job_run_id`.
    ///
    /// Returns `Ok(false)` when the command is missing, fails or panics. An
    /// `Err` means the run could not be recorded.
    pub async fn run(
        &self,
        prepared: &PreparedAction,
        ordinal: i32,
        job_run_id: i64,
    ) -> AppResult<bool> {
        let action = &prepared.action;
        let action_run = self
            .store
            .create_action_run(NewActionRun {
                job_run_id,
                action_id: action.id,
                command_name: action.command_name.clone(),
                ordinal,
                started_at: Utc::now().naive_utc(),
            })
            .await?;

        let log = StoreLogSink::new(Arc::clone(&self.store), action_run.id);
        let success = match &prepared.command {
            None => {
                tracing::error!(
                    job_run_id,
                    action_run_id = action_run.id,
                    command = %action.command_name,
                    "Command is not registered"
                );
                log.error(
                    &format!("Command '{}' is not registered", action.command_name),
                    None,
                )
                .await;
                false
            }
            Some(command) => {
                self.invoke(command.as_ref(), prepared, job_run_id, action_run.id, &log)
                    .await
            }
        };

        self.store
            .finish_action_run(action_run.id, Utc::now().naive_utc())
            .await?;

        Ok(success)
    }

    async fn invoke(
        &self,
        command: &dyn Command,
        prepared: &PreparedAction,
        job_run_id: i64,
        action_run_id: i64,
        log: &StoreLogSink,
    ) -> bool {
        let ctx = CommandContext {
            params: &prepared.params,
            log,
            store: Arc::clone(&self.store),
            job_id: prepared.action.job_id,
            job_run_id,
        };

        tracing::debug!(
            job_run_id,
            action_run_id,
            command = command.name(),
            params = ?prepared.params.entries(),
            "Invoking command"
        );

        let outcome = AssertUnwindSafe(command.execute(&ctx)).catch_unwind().await;
        let (message, detail) = match outcome {
            Ok(Ok(())) => {
                tracing::debug!(
                    job_run_id,
                    action_run_id,
                    command = command.name(),
                    "Command succeeded"
                );
                return true;
            }
            Ok(Err(e)) => (e.to_string(), format!("{:?}", e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                (format!("panicked: {}", message), message)
            }
        };

        let error = AppError::CommandExecution {
            command: command.name().to_string(),
            message,
        };
        tracing::warn!(job_run_id, action_run_id, error = %error, "Action failed");
        log.error(&error.to_string(), Some(&detail)).await;
        false
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;

    use crate::commands::{Command, CommandContext, ParameterKind, ParameterSpec};

    /// Fails when its `Fail` parameter is true, panics when `Panic` is true.
    pub(crate) struct ProbeCommand;

    #[async_trait]
    impl Command for ProbeCommand {
        fn name(&self) -> &'static str {
            "Probe"
        }

        fn parameters(&self) -> Vec<ParameterSpec> {
            vec![
                ParameterSpec::new("Fail", ParameterKind::Bool).default_value("false"),
                ParameterSpec::new("Panic", ParameterKind::Bool).default_value("false"),
                ParameterSpec::new("Value", ParameterKind::String).default_value("declared"),
            ]
        }

        async fn execute(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
            ctx.log
                .info(&format!("value={}", ctx.params.get("Value").unwrap_or_default()))
                .await;
            if ctx.params.get_bool("Panic")? {
                panic!("probe panicked");
            }
            if ctx.params.get_bool("Fail")? {
                anyhow::bail!("probe failed");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::testing::ProbeCommand;
    use super::*;
    use crate::commands::SettingsDefaults;
    use crate::models::{LogLevel, NewJobRun};
    use crate::repositories::MemoryJobStore;

    fn action(command: &str) -> Action {
        Action {
            id: 7,
            job_id: 1,
            command_name: command.to_string(),
            position: 0,
            enabled: true,
            description: None,
        }
    }

    fn parameter(name: &str, value: &str, enabled: bool) -> ActionParameter {
        ActionParameter {
            id: 1,
            action_id: 7,
            name: name.to_string(),
            value: value.to_string(),
            enabled,
        }
    }

    fn runner(store: Arc<MemoryJobStore>, config: &[(&str, &str)]) -> ActionRunner {
        let mut registry = CommandRegistry::new();
        registry.register(ProbeCommand);
        let table = config
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        let defaults = SettingsDefaults::new(BTreeMap::from([("probe".to_string(), table)]));
        ActionRunner::new(store, Arc::new(registry), Arc::new(defaults))
    }

    async fn job_run(store: &MemoryJobStore) -> i64 {
        store
            .create_job_run(NewJobRun {
                job_id: 1,
                job_name: "job".to_string(),
                started_at: Utc::now().naive_utc(),
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_override_beats_configured_default() {
        let store = Arc::new(MemoryJobStore::new());
        let runner = runner(store, &[("value", "configured")]);

        let prepared = runner.prepare(&action("probe"), &[parameter("VALUE", "override", true)]);
        assert_eq!(prepared.params.get("Value"), Some("override"));

        let prepared = runner.prepare(&action("probe"), &[]);
        assert_eq!(prepared.params.get("Value"), Some("configured"));
    }

    #[test]
    fn test_declared_default_and_disabled_override() {
        let store = Arc::new(MemoryJobStore::new());
        let runner = runner(store, &[]);

        let prepared = runner.prepare(&action("Probe"), &[parameter("Value", "ignored", false)]);
        assert_eq!(prepared.params.get("value"), Some("declared"));
        assert_eq!(prepared.params.entries()[2], ("Value", "declared"));
    }

    #[tokio::test]
    async fn test_successful_run_closes_action_run() {
        let store = Arc::new(MemoryJobStore::new());
        let runner = runner(store.clone(), &[]);
        let job_run_id = job_run(&store).await;

        let prepared = runner.prepare(&action("probe"), &[]);
        assert!(runner.run(&prepared, 0, job_run_id).await.unwrap());

        let runs = store.action_runs(job_run_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].ended_at.is_some());
        assert_eq!(runs[0].command_name, "probe");
        let messages = store.log_messages(runs[0].id).await.unwrap();
        assert_eq!(messages[0].message, "value=declared");
    }

    #[tokio::test]
    async fn test_unregistered_command_logs_one_error() {
        let store = Arc::new(MemoryJobStore::new());
        let runner = runner(store.clone(), &[]);
        let job_run_id = job_run(&store).await;

        let prepared = runner.prepare(&action("Nope"), &[parameter("x", "1", true)]);
        assert!(prepared.command.is_none());
        assert!(!runner.run(&prepared, 0, job_run_id).await.unwrap());

        let runs = store.action_runs(job_run_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].ended_at.is_some());
        let messages = store.log_messages(runs[0].id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, LogLevel::Error);
        assert!(messages[0].message.contains("Nope"));
    }

    #[tokio::test]
    async fn test_error_and_panic_are_contained() {
        let store = Arc::new(MemoryJobStore::new());
        let runner = runner(store.clone(), &[]);
        let job_run_id = job_run(&store).await;

        let failing = runner.prepare(&action("probe"), &[parameter("Fail", "true", true)]);
        assert!(!runner.run(&failing, 0, job_run_id).await.unwrap());

        let panicking = runner.prepare(&action("probe"), &[parameter("Panic", "yes", true)]);
        assert!(!runner.run(&panicking, 1, job_run_id).await.unwrap());

        let runs = store.action_runs(job_run_id).await.unwrap();
        assert_eq!(runs.len(), 2);
        for (run, expected) in runs.iter().zip(["probe failed", "probe panicked"]) {
            assert!(run.ended_at.is_some());
            let messages = store.log_messages(run.id).await.unwrap();
            let last = messages.last().unwrap();
            assert_eq!(last.level, LogLevel::Error);
            assert!(last.message.contains(expected), "{}", last.message);
            assert!(last.error_detail.is_some());
        }
    }
}
