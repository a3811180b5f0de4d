use std::sync::Arc;

use dashmap::DashSet;

/// Set of job ids currently executing.
///
/// A fire for an id already in the set is dropped, not queued. Coordinators
/// that share one guard exclude each other; separate guards do not.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    running: DashSet<i32>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `job_id`. Returns `None` if it is already running.
    pub fn try_begin(self: &Arc<Self>, job_id: i32) -> Option<ExecutionToken> {
        self.running.insert(job_id).then(|| ExecutionToken {
            guard: Arc::clone(self),
            job_id,
        })
    }

    pub fn is_running(&self, job_id: i32) -> bool {
        self.running.contains(&job_id)
    }

    pub fn running(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.running.iter().map(|id| *id).collect();
        ids.sort_unstable();
        ids
    }
}

/// Releases its job id when dropped, including during unwinding.
#[derive(Debug)]
pub struct ExecutionToken {
    guard: Arc<ExecutionGuard>,
    job_id: i32,
}

impl ExecutionToken {
    pub fn job_id(&self) -> i32 {
        self.job_id
    }
}

impl Drop for ExecutionToken {
    fn drop(&mut self) {
        self.guard.running.remove(&self.job_id);
    }
}
