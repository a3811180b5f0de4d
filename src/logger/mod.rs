//! Process Logger Module
//!
//! A logging system based on `tracing-subscriber` with support for:
//! - Console output with color control
//! - File output in Full, Compact or JSON format
//!
//! This is the operator-facing log. Per-run audit messages written by
//! commands go to the job store through `jobs::log_sink` instead.

pub mod config;
pub mod error;

pub use config::*;
pub use error::LoggerError;

use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global logger with the given configuration
pub fn init_logger(config: LoggerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let filter = build_filter(&config.level);

    match (config.console.enabled, config.file.enabled) {
        (true, true) => init_both(&config, filter)?,
        (true, false) => init_console_only(&config.console, filter)?,
        (false, true) => init_file_only(&config.file, filter)?,
        (false, false) => {
            return Err(LoggerError::config("At least one output must be enabled").into());
        }
    }

    Ok(())
}

/// `level` applies to cadence itself; dependencies stay at `warn` unless
/// `RUST_LOG` says otherwise.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = format!("warn,cadence={}", level.to_lowercase());
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Opens (and creates the parent of) the log file.
fn open_log_file(path: &Path, append: bool) -> Result<Mutex<File>, LoggerError> {
    let to_error = |source| LoggerError::Open {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(to_error)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(to_error)?;

    Ok(Mutex::new(file))
}

fn init_console_only(config: &ConsoleConfig, filter: EnvFilter) -> Result<(), LoggerError> {
    let use_ansi = config.colored && std::io::stdout().is_terminal();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(use_ansi).with_target(true))
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

fn init_file_only(config: &FileConfig, filter: EnvFilter) -> Result<(), LoggerError> {
    let writer = open_log_file(&config.path, config.append)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Full => registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().with_ansi(false).compact().with_writer(writer))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_ansi(false).json().with_writer(writer))
            .try_init(),
    };

    result.map_err(|_| LoggerError::AlreadyInitialized)
}

fn init_both(config: &LoggerConfig, filter: EnvFilter) -> Result<(), LoggerError> {
    let use_ansi = config.console.colored && std::io::stdout().is_terminal();
    let writer = open_log_file(&config.file.path, config.file.append)?;

    // File layer goes first so span fields are not formatted with ANSI codes
    // (tokio-rs/tracing#1817).
    let result = match config.file.format {
        LogFormat::Full => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .with(fmt::layer().with_ansi(use_ansi).with_target(true))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).compact().with_writer(writer))
            .with(fmt::layer().with_ansi(use_ansi).with_target(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).json().with_writer(writer))
            .with(fmt::layer().with_ansi(use_ansi).with_target(true))
            .try_init(),
    };

    result.map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/cadence.log");

        open_log_file(&path, true).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_log_file_append_keeps_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cadence.log");
        std::fs::write(&path, "first\n").unwrap();

        let writer = open_log_file(&path, true).unwrap();
        writer.lock().unwrap().write_all(b"second\n").unwrap();
        drop(writer);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_log_file_truncates_without_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cadence.log");
        std::fs::write(&path, "stale\n").unwrap();

        drop(open_log_file(&path, false).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_init_logger_rejects_invalid_level() {
        let config = LoggerConfig {
            level: "nope".to_string(),
            ..Default::default()
        };
        assert!(init_logger(config).is_err());
    }
}
