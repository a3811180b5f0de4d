mod echo;
mod purge_history;
mod shell;

pub use echo::EchoCommand;
pub use purge_history::PurgeHistoryCommand;
pub use shell::ShellCommand;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::commands::{CommandContext, ParameterMap};
    use crate::jobs::LogSink;
    use crate::repositories::{JobStore, MemoryJobStore};

    pub(crate) fn context<'a>(
        params: &'a ParameterMap,
        log: &'a dyn LogSink,
    ) -> CommandContext<'a> {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        context_with_store(params, log, store)
    }

    pub(crate) fn context_with_store<'a>(
        params: &'a ParameterMap,
        log: &'a dyn LogSink,
        store: Arc<dyn JobStore>,
    ) -> CommandContext<'a> {
        CommandContext {
            params,
            log,
            store,
            job_id: 1,
            job_run_id: 1,
        }
    }
}
