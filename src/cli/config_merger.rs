//! Configuration merging for CLI arguments
//!
//! Command-line flags take precedence over every configuration source:
//! files, then `CADENCE_*` environment variables, then CLI arguments.

use std::path::Path;

use super::parser::{Cli, Commands};
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, Environment, Settings};

/// Applies CLI overrides on top of loaded settings
#[derive(Debug)]
pub struct ConfigurationMerger {
    base_config: Settings,
}

impl ConfigurationMerger {
    pub fn new(base_config: Settings) -> Self {
        Self { base_config }
    }

    /// Loads the base configuration, from `config_path` alone when given or
    /// from the layered `config/` directory otherwise.
    pub fn load(
        config_path: Option<&Path>,
        environment: Option<Environment>,
    ) -> Result<Self, ConfigError> {
        let loader = match config_path {
            Some(path) => ConfigLoader::with_file(path),
            None => ConfigLoader::new()?,
        };
        let loader = match environment {
            Some(environment) => loader.environment_override(environment),
            None => loader,
        };

        Ok(Self::new(loader.load()?))
    }

    /// Returns a copy of the base settings with CLI overrides applied, then
    /// validates the result.
    pub fn merge_cli_args(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut config = self.base_config.clone();

        if cli.verbose {
            config.logger.level = "debug".to_string();
        } else if cli.quiet {
            config.logger.level = "error".to_string();
        }

        if let Some(Commands::Serve {
            workers, log_level, ..
        }) = &cli.command
        {
            if let Some(workers) = workers {
                config.scheduler.worker_threads = usize::from(*workers);
            }
            // Command-specific level wins over --verbose/--quiet.
            if let Some(level) = log_level {
                config.logger.level = level.clone().into();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &Settings {
        &self.base_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn merge(args: &[&str]) -> Settings {
        let merger = ConfigurationMerger::new(Settings::default());
        let cli = Cli::try_parse_from(args).unwrap();
        merger.merge_cli_args(&cli).unwrap()
    }

    #[test]
    fn test_merge_without_flags_keeps_base() {
        let merged = merge(&["cadence"]);
        assert_eq!(merged, Settings::default());
    }

    #[test]
    fn test_merge_verbose_and_quiet() {
        assert_eq!(merge(&["cadence", "--verbose"]).logger.level, "debug");
        assert_eq!(merge(&["cadence", "--quiet"]).logger.level, "error");
    }

    #[test]
    fn test_merge_serve_workers() {
        let merged = merge(&["cadence", "serve", "--workers", "3"]);
        assert_eq!(merged.scheduler.worker_threads, 3);
    }

    #[test]
    fn test_command_log_level_overrides_global() {
        let merged = merge(&["cadence", "--verbose", "serve", "--log-level", "warn"]);
        assert_eq!(merged.logger.level, "warn");
    }

    #[test]
    fn test_merge_rejects_invalid_base() {
        let mut base = Settings::default();
        base.database.url = "mysql://localhost/jobs".to_string();
        let merger = ConfigurationMerger::new(base);
        let cli = Cli::try_parse_from(["cadence"]).unwrap();

        assert!(matches!(
            merger.merge_cli_args(&cli),
            Err(ConfigError::ValidationError { field, .. }) if field == "database.url"
        ));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [scheduler]
            history_retention_days = 9

            [commands.echo]
            message = "hi"
            "#
        )
        .unwrap();

        let merger = ConfigurationMerger::load(Some(file.path()), None).unwrap();
        assert_eq!(merger.config().scheduler.history_retention_days, 9);
        assert_eq!(merger.config().commands["echo"]["message"], "hi");
    }
}
