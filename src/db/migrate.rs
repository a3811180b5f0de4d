//! Embedded migration runner.
//!
//! diesel_migrations only drives synchronous connections, so each operation
//! opens a dedicated `PgConnection` on the blocking pool.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;

use super::MIGRATIONS;
use crate::error::{AppError, AppResult};

fn establish(database_url: &str, operation: &str) -> AppResult<PgConnection> {
    PgConnection::establish(database_url).map_err(|e| AppError::Database {
        operation: format!("establish connection for {}", operation),
        source: anyhow::anyhow!("Connection error: {}", e),
    })
}

fn migration_error(operation: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Database {
        operation: operation.to_string(),
        source: anyhow::anyhow!("Migration error: {}", e),
    }
}

async fn blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?
}

/// Names of migrations not yet applied.
pub async fn pending_migrations(database_url: &str) -> AppResult<Vec<String>> {
    let database_url = database_url.to_string();
    blocking(move || {
        let mut conn = establish(&database_url, "migration check")?;
        let pending = conn
            .pending_migrations(MIGRATIONS)
            .map_err(|e| migration_error("check pending migrations", e))?;
        Ok(pending.iter().map(|m| m.name().to_string()).collect())
    })
    .await
}

/// Applies every pending migration and returns the applied versions.
pub async fn run_pending_migrations(database_url: &str) -> AppResult<Vec<String>> {
    let database_url = database_url.to_string();
    blocking(move || {
        let mut conn = establish(&database_url, "migrations")?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| migration_error("run pending migrations", e))?;
        Ok(applied.iter().map(|m| m.to_string()).collect())
    })
    .await
}

/// Reverts the last `steps` migrations.
pub async fn revert_migrations(database_url: &str, steps: u32) -> AppResult<usize> {
    if steps == 0 {
        return Err(AppError::validation(
            "rollback_steps",
            "Number of rollback steps must be greater than 0",
        ));
    }

    let database_url = database_url.to_string();
    blocking(move || {
        let mut conn = establish(&database_url, "rollback")?;
        let applied = conn
            .applied_migrations()
            .map_err(|e| migration_error("get applied migrations", e))?;

        if applied.len() < steps as usize {
            return Err(AppError::validation(
                "rollback_steps",
                format!(
                    "Cannot rollback {} migrations - only {} applied migrations available",
                    steps,
                    applied.len()
                ),
            ));
        }

        for _ in 0..steps {
            conn.revert_last_migration(MIGRATIONS)
                .map_err(|e| migration_error("revert migration", e))?;
        }

        Ok(steps as usize)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revert_zero_steps_is_rejected_before_connecting() {
        let result = revert_migrations("postgres://unreachable/none", 0).await;
        assert!(matches!(
            result,
            Err(AppError::Validation { field, .. }) if field == "rollback_steps"
        ));
    }
}
