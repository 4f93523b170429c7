//! Asynchronous access-log sink
//!
//! Every admitted request produces one [`AccessLogEntry`]. The request path
//! must never wait for the database write, so entries go through a bounded
//! mpsc queue consumed by a background writer task. A full queue drops the
//! entry with a counted metric and a warning rather than blocking or
//! panicking. Failed inserts are reported to tracing, never to the client.

use crate::models::AccessLogEntry;
use crate::storage::Storage;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

enum WriterMessage {
    Record(AccessLogEntry),
    /// Drain whatever is queued, then stop the writer task.
    Shutdown,
}

pub struct AccessLogWriter {
    tx: mpsc::Sender<WriterMessage>,
    dropped: Arc<AtomicU64>,
    handle: tokio::task::JoinHandle<()>,
}

impl AccessLogWriter {
    pub fn new(storage: Arc<dyn Storage>, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let handle = tokio::spawn(writer_task(storage, rx));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            handle,
        }
    }

    /// Enqueue an entry without blocking. Drops (and counts) when the queue
    /// is full.
    pub fn record(&self, entry: AccessLogEntry) {
        if self.tx.try_send(WriterMessage::Record(entry)).is_err() {
            let dropped = self.dropped.fetch_add(1, Relaxed) + 1;
            warn!(dropped_total = dropped, "access log queue full, dropping entry");
        }
    }

    /// Entries dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Relaxed)
    }

    /// Drain the queue and stop the writer task.
    pub async fn shutdown(self) {
        let _ = self.tx.send(WriterMessage::Shutdown).await;
        if let Err(e) = self.handle.await {
            error!(error = %e, "access log writer task panicked");
        }
    }
}

async fn writer_task(storage: Arc<dyn Storage>, mut rx: mpsc::Receiver<WriterMessage>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMessage::Record(entry) => {
                if let Err(e) = storage.insert_log(&entry).await {
                    error!(key = %entry.key, error = %e, "failed to write access log entry");
                }
            }
            WriterMessage::Shutdown => {
                // Sender side may still hold queued records; drain them first.
                rx.close();
                while let Some(WriterMessage::Record(entry)) = rx.recv().await {
                    if let Err(e) = storage.insert_log(&entry).await {
                        error!(key = %entry.key, error = %e, "failed to write access log entry");
                    }
                }
                info!("access log writer drained and stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn test_storage() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn entry(key: &str) -> AccessLogEntry {
        AccessLogEntry {
            key: key.to_string(),
            time: 1_700_000_000,
            ip: "203.0.113.7".to_string(),
            user_agent: "test-agent".to_string(),
            referer: None,
        }
    }

    #[tokio::test]
    async fn test_entries_reach_storage() {
        let storage = test_storage().await;
        let writer = AccessLogWriter::new(Arc::clone(&storage), 64);

        writer.record(entry("abc123"));
        writer.record(entry("abc123"));
        writer.shutdown().await;

        let logs = storage.logs_for_key("abc123").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].ip, "203.0.113.7");
        assert_eq!(logs[0].user_agent, "test-agent");
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let storage = test_storage().await;
        let writer = AccessLogWriter::new(Arc::clone(&storage), 256);

        for _ in 0..100 {
            writer.record(entry("burst"));
        }
        writer.shutdown().await;

        let logs = storage.logs_for_key("burst").await.unwrap();
        assert_eq!(logs.len(), 100);
    }

    #[tokio::test]
    async fn test_full_queue_drops_with_count() {
        let storage = test_storage().await;
        // Single-slot queue makes overflow deterministic once the writer
        // is prevented from draining; easiest is to flood far beyond
        // capacity before the task gets scheduled.
        let writer = AccessLogWriter::new(Arc::clone(&storage), 1);

        for _ in 0..50 {
            writer.record(entry("flood"));
        }
        let dropped = writer.dropped();
        writer.shutdown().await;

        let logs = storage.logs_for_key("flood").await.unwrap();
        assert_eq!(logs.len() as u64 + dropped, 50);
        assert!(dropped > 0, "expected at least one dropped entry");
    }
}
