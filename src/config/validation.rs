//! Configuration validation logic
//!
//! Each settings section validates itself; `Settings::validate` reports the
//! first failure so startup fails with a single actionable message.

use crate::config::error::ConfigError;
use crate::config::settings::{
    DatabaseConfig, FileSettings, LoggerSettings, SchedulerConfig, Settings,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

/// Accepted PostgreSQL URL schemes
const POSTGRES_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must be `memory` or a PostgreSQL connection URL
    /// - Min connections must be greater than 0 and not exceed max connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Use \"memory\" or a postgres:// connection string.",
            ));
        }

        if !self.is_memory() && !POSTGRES_SCHEMES.iter().any(|s| self.url.starts_with(s)) {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL. Expected \"memory\" or postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        self.file.validate()
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration
    ///
    /// # Validation Rules
    /// - At least one worker slot
    /// - Retention of at least one day
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::validation(
                "scheduler.worker_threads",
                "Worker threads must be greater than 0.",
            ));
        }

        if self.history_retention_days == 0 {
            return Err(ConfigError::validation(
                "scheduler.history_retention_days",
                "History retention must be at least 1 day.",
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings, returning the first failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.logger.validate()?;
        self.scheduler.validate()?;

        if let Some(name) = self.commands.keys().find(|name| name.trim().is_empty()) {
            return Err(ConfigError::validation(
                format!("commands.{}", name),
                "Command name must not be empty.",
            ));
        }

        Ok(())
    }
}
