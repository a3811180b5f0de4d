use async_trait::async_trait;

use crate::commands::{Command, CommandContext, ParameterKind, ParameterSpec};
use crate::models::LogLevel;

/// Writes `Message` to the run log at `Level`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCommand;

#[async_trait]
impl Command for EchoCommand {
    fn name(&self) -> &'static str {
        "Echo"
    }

    fn description(&self) -> &'static str {
        "Write a message to the run log"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("Message", ParameterKind::Text)
                .describe("Text to log")
                .default_value(""),
            ParameterSpec::new("Level", ParameterKind::Option)
                .describe("Log level")
                .options(LogLevel::ALL.iter().map(LogLevel::as_str))
                .default_value("info"),
        ]
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        let message = ctx.params.get("Message").unwrap_or_default();
        let level = match ctx.params.get("Level") {
            Some(raw) => raw.parse::<LogLevel>().map_err(anyhow::Error::msg)?,
            None => LogLevel::Info,
        };

        ctx.log.append(level, message, None).await;
        Ok(())
    }
}
