//! Service layer for job administration.
//!
//! Services sit between the CLI handlers and the store, keeping the live
//! scheduler in step with every definition change.

mod job_service;

pub use job_service::{ActionRunDetail, JobService, RunDetail};
