use crate::models::{AccessLogEntry, ShortUrl};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS url (
                id BIGSERIAL PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                long_url TEXT NOT NULL,
                visit_count BIGINT NOT NULL DEFAULT 0
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
                id BIGSERIAL PRIMARY KEY,
                key TEXT NOT NULL,
                time BIGINT NOT NULL,
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
            WHERE key = $1
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
            WHERE key = $1
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
            VALUES ($1, $2, $3, $4, $5)
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
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
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
            WHERE key = $1
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
            WHERE key = $1
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
