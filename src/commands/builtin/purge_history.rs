use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::commands::{Command, CommandContext, ParameterKind, ParameterSpec};

const MAX_RETENTION_DAYS: i64 = 3650;

/// Deletes finished job runs older than `RetentionDays`.
///
/// Action runs and log messages go with their job run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeHistoryCommand;

#[async_trait]
impl Command for PurgeHistoryCommand {
    fn name(&self) -> &'static str {
        "PurgeHistory"
    }

    fn description(&self) -> &'static str {
        "Delete run history older than the retention period"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("RetentionDays", ParameterKind::Int)
                .describe("Keep runs that ended within this many days")
                .range(1, MAX_RETENTION_DAYS)
                .default_value("30"),
        ]
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        let retention_days = ctx.params.get_i64("RetentionDays")?;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            anyhow::bail!(
                "RetentionDays must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                retention_days
            );
        }

        let cutoff = Utc::now().naive_utc() - Duration::days(retention_days);
        let deleted = ctx.store.purge_job_runs(cutoff).await?;

        tracing::info!(
            deleted_count = deleted,
            retention_days,
            "Run history purge completed"
        );
        ctx.log
            .info(&format!(
                "Deleted {} job run(s) that ended before {}",
                deleted,
                cutoff.format("%Y-%m-%d %H:%M:%S")
            ))
            .await;

        Ok(())
    }
}
