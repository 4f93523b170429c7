use crate::models::{AccessLogEntry, ShortUrl};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS url (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                long_url TEXT NOT NULL,
                visit_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_url_key ON url(key)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                time INTEGER NOT NULL,
                ip TEXT NOT NULL,
                ua TEXT NOT NULL,
                referer TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ShortUrl>> {
        let url = sqlx::query_as::<_, ShortUrl>(
            r#"
            SELECT id, key, long_url, visit_count
            FROM url
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(url)
    }

    async fn increment_visits(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE url
            SET visit_count = visit_count + 1
            WHERE key = ?
            "#,
        )
        .bind(key)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_log(&self, entry: &AccessLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO log (key, time, ip, ua, referer)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.key)
        .bind(entry.time)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(&entry.referer)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create(&self, key: &str, long_url: &str) -> StorageResult<ShortUrl> {
        let result = sqlx::query(
            r#"
            INSERT INTO url (key, long_url)
            VALUES (?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(long_url)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let url = sqlx::query_as::<_, ShortUrl>(
            r#"
            SELECT id, key, long_url, visit_count
            FROM url
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(url)
    }

    async fn logs_for_key(&self, key: &str) -> Result<Vec<AccessLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT key, time, ip, ua, referer
            FROM log
            WHERE key = ?
            ORDER BY time DESC, id DESC
            "#,
        )
        .bind(key)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AccessLogEntry {
                key: row.get("key"),
                time: row.get("time"),
                ip: row.get("ip"),
                user_agent: row.get("ua"),
                referer: row.get("referer"),
            })
            .collect())
    }
}
