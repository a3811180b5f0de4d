pub mod engine;
pub mod executor;
pub mod guard;
pub mod log_sink;
pub mod recurrence;
pub mod runner;
pub mod scheduler;
pub mod sync;

pub use engine::Engine;
pub use executor::{ExecutionCoordinator, ExecutionOutcome};
pub use guard::{ExecutionGuard, ExecutionToken};
pub use log_sink::{LogSink, StoreLogSink};
pub use recurrence::Recurrence;
pub use runner::{ActionRunner, PreparedAction};
pub use scheduler::{CronTriggerBackend, FireCallback, LiveState, TriggerBackend};
pub use sync::{ScheduleSynchronizer, SyncOutcome, SyncReport};
