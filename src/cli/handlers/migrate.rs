//! Migrate command handler
//!
//! Handles database migration operations including dry-run and rollback.

use crate::config::settings::Settings;
use crate::db::migrate;
use crate::error::AppResult;

/// Handler for the migrate command
pub struct MigrateCommandHandler {
    config: Settings,
}

impl MigrateCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Applies pending migrations, lists them on `dry_run`, or reverts the
    /// last `rollback` migrations.
    ///
    /// # Errors
    /// - Database connection errors
    /// - Migration execution errors
    /// - Rollback steps of zero or beyond the applied migrations
    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        self.config.database.validate()?;

        if self.config.database.is_memory() {
            println!("✓ The in-memory job store has no schema - nothing to migrate");
            return Ok(());
        }

        let url = &self.config.database.url;
        if dry_run {
            println!("Checking for pending migrations...");
            let pending = migrate::pending_migrations(url).await?;
            if pending.is_empty() {
                println!("✓ No pending migrations found - database is up to date");
            } else {
                println!("Found {} pending migration(s):", pending.len());
                for name in &pending {
                    println!("  - {}", name);
                }
                println!("\nRun without --dry-run to apply these migrations");
            }
        } else if let Some(steps) = rollback {
            println!("Rolling back {} migration(s)...", steps);
            let reverted = migrate::revert_migrations(url, steps).await?;
            println!("✓ Rolled back {} migration(s)", reverted);
        } else {
            println!("Running database migrations...");
            let applied = migrate::run_pending_migrations(url).await?;
            if applied.is_empty() {
                println!("✓ No migrations to apply - database is already up to date");
            } else {
                println!("✓ Applied {} migration(s):", applied.len());
                for migration in &applied {
                    println!("  - {}", migration);
                }
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_migrate_handler_new() {
        let config = Settings::default();
        let handler = MigrateCommandHandler::new(config.clone());
        assert_eq!(handler.config(), &config);
    }

    #[tokio::test]
    async fn test_memory_store_needs_no_migrations() {
        let handler = MigrateCommandHandler::new(Settings::default());
        assert!(handler.execute(false, None).await.is_ok());
        assert!(handler.execute(true, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_database_url_is_rejected() {
        let mut config = Settings::default();
        config.database.url = "sqlite://jobs.db".to_string();

        let err = MigrateCommandHandler::new(config)
            .execute(false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration { key, .. } if key == "database.url"));
    }
}
