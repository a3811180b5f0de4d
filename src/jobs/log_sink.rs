//! Per-action audit log.
//!
//! Each `append` writes one row immediately; there is no buffering. Sequence
//! numbers start at 0 for every action run and advance only when a write
//! succeeds, so a failed write leaves no gap.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{LogLevel, NewLogMessage};
use crate::repositories::JobStore;

/// Destination for the messages a command emits while it runs.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, level: LogLevel, message: &str, error_detail: Option<&str>);

    async fn trace(&self, message: &str) {
        self.append(LogLevel::Trace, message, None).await
    }

    async fn debug(&self, message: &str) {
        self.append(LogLevel::Debug, message, None).await
    }

    async fn info(&self, message: &str) {
        self.append(LogLevel::Info, message, None).await
    }

    async fn warn(&self, message: &str) {
        self.append(LogLevel::Warn, message, None).await
    }

    async fn error(&self, message: &str, error_detail: Option<&str>) {
        self.append(LogLevel::Error, message, error_detail).await
    }
}

/// Writes log messages for one action run to the job store.
pub struct StoreLogSink {
    store: Arc<dyn JobStore>,
    action_run_id: i64,
    /// Held across the write so concurrent appends cannot interleave sequences.
    next_sequence: Mutex<i32>,
}

impl StoreLogSink {
    pub fn new(store: Arc<dyn JobStore>, action_run_id: i64) -> Self {
        Self {
            store,
            action_run_id,
            next_sequence: Mutex::new(0),
        }
    }

    /// Number of messages written so far.
    #[cfg(test)]
    pub(crate) async fn written(&self) -> i32 {
        *self.next_sequence.lock().await
    }
}

#[async_trait]
impl LogSink for StoreLogSink {
    async fn append(&self, level: LogLevel, message: &str, error_detail: Option<&str>) {
        let mut sequence = self.next_sequence.lock().await;

        let row = NewLogMessage {
            action_run_id: self.action_run_id,
            sequence: *sequence,
            level,
            logged_at: Utc::now().naive_utc(),
            message: message.to_string(),
            error_detail: error_detail.map(str::to_string),
        };

        match self.store.append_log_message(row).await {
            Ok(_) => *sequence += 1,
            Err(e) => tracing::warn!(
                action_run_id = self.action_run_id,
                sequence = *sequence,
                %level,
                error = %e,
                "Failed to persist log message"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Captures appended messages in memory.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) entries: Mutex<Vec<(LogLevel, String, Option<String>)>>,
    }

    impl RecordingSink {
        pub(crate) async fn messages(&self) -> Vec<(LogLevel, String)> {
            self.entries
                .lock()
                .await
                .iter()
                .map(|(level, message, _)| (*level, message.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl LogSink for RecordingSink {
        async fn append(&self, level: LogLevel, message: &str, error_detail: Option<&str>) {
            self.entries.lock().await.push((
                level,
                message.to_string(),
                error_detail.map(str::to_string),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewActionRun, NewJobRun};
    use crate::repositories::MemoryJobStore;

    async fn action_run(store: &MemoryJobStore) -> i64 {
        let run = store
            .create_job_run(NewJobRun {
                job_id: 1,
                job_name: "job".to_string(),
                started_at: Utc::now().naive_utc(),
            })
            .await
            .unwrap();
        store
            .create_action_run(NewActionRun {
                job_run_id: run.id,
                action_id: 1,
                command_name: "echo".to_string(),
                ordinal: 0,
                started_at: Utc::now().naive_utc(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_sequences_increase_per_write() {
        let store = Arc::new(MemoryJobStore::new());
        let action_run_id = action_run(&store).await;
        let sink = StoreLogSink::new(store.clone(), action_run_id);

        sink.info("first").await;
        sink.warn("second").await;
        sink.error("third", Some("detail")).await;

        let messages = store.log_messages(action_run_id).await.unwrap();
        let sequences: Vec<i32> = messages.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, [0, 1, 2]);
        assert_eq!(messages[2].level, LogLevel::Error);
        assert_eq!(messages[2].error_detail.as_deref(), Some("detail"));
        assert_eq!(sink.written().await, 3);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_consume_sequence() {
        let store = Arc::new(MemoryJobStore::new());
        let action_run_id = action_run(&store).await;
        let sink = StoreLogSink::new(store.clone(), action_run_id);

        sink.info("kept").await;
        store.fail_next_log_writes(1);
        sink.info("lost").await;
        sink.info("also kept").await;

        let messages = store.log_messages(action_run_id).await.unwrap();
        let rows: Vec<(i32, &str)> = messages
            .iter()
            .map(|m| (m.sequence, m.message.as_str()))
            .collect();
        assert_eq!(rows, [(0, "kept"), (1, "also kept")]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_unique_sequences() {
        let store = Arc::new(MemoryJobStore::new());
        let action_run_id = action_run(&store).await;
        let sink = Arc::new(StoreLogSink::new(store.clone(), action_run_id));

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move { sink.debug(&format!("message {}", i)).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let sequences: Vec<i32> = store
            .log_messages(action_run_id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(sequences, (0..8).collect::<Vec<_>>());
    }
}
