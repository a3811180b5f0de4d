//! Configuration management module for cadence
//!
//! This module provides layered configuration loading with support for:
//! - TOML configuration files
//! - Environment variable overrides
//! - Multiple environment configurations (development, test, staging, production)
//!
//! # Configuration Priority (lowest to highest)
//! 1. built-in defaults
//! 2. `default.toml`
//! 3. `{environment}.toml`
//! 4. `local.toml` (not committed to version control)
//! 5. `CADENCE_*` environment variables

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use loader::ConfigLoader;
pub use settings::{DatabaseConfig, SchedulerConfig, Settings};
