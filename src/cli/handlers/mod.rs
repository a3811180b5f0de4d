//! Command handlers for CLI operations
//!
//! This module contains handlers for different CLI commands,
//! separating command execution logic from parsing and validation.

pub mod admin;
pub mod history;
pub mod migrate;
pub mod run;
pub mod serve;
pub mod sync;

pub use admin::AdminCommandHandler;
pub use history::HistoryCommandHandler;
pub use migrate::MigrateCommandHandler;
pub use run::RunCommandHandler;
pub use serve::ServeCommandHandler;
pub use sync::SyncCommandHandler;
