//! Cadence
//!
//! Weekly job scheduler: named jobs run ordered command pipelines on
//! day-of-week and time-of-day triggers, with every run recorded.

use shadow_rs::shadow;
shadow!(build);

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logger;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod services;
pub mod state;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}
