use crate::models::{AccessLogEntry, ShortUrl};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short key already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Look up a short URL by key
    async fn get(&self, key: &str) -> Result<Option<ShortUrl>>;

    /// Atomically bump the visit counter for a key.
    ///
    /// The increment happens inside a single SQL UPDATE so concurrent
    /// redirects to the same key cannot lose updates. Returns whether a row
    /// matched.
    async fn increment_visits(&self, key: &str) -> Result<bool>;

    /// Append an access-log record
    async fn insert_log(&self, entry: &AccessLogEntry) -> Result<()>;

    /// Insert a short URL (keys are provisioned out-of-band; used by tests
    /// and tooling)
    async fn create(&self, key: &str, long_url: &str) -> StorageResult<ShortUrl>;

    /// Access-log rows for a key, newest first (used by tests and tooling)
    async fn logs_for_key(&self, key: &str) -> Result<Vec<AccessLogEntry>>;
}
