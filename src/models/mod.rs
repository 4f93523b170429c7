use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sentinel keys logged for the fixed static routes.
pub mod sentinel {
    pub const HOME: &str = "home";
    pub const SITEMAP: &str = "sitemap";
    pub const ROBOTS: &str = "robots";
    pub const ADS: &str = "ads";
}

/// A short key → destination URL mapping.
///
/// Rows are created out-of-band; this service only reads them and bumps
/// `visit_count` on successful redirects.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortUrl {
    pub id: i64,
    pub key: String,
    pub long_url: String,
    pub visit_count: i64,
}

/// One append-only record per admitted inbound request.
///
/// `key` is either the requested short code or one of the [`sentinel`]
/// values for static routes. `time` is unix seconds.
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub key: String,
    pub time: i64,
    pub ip: String,
    pub user_agent: String,
    pub referer: Option<String>,
}

impl AccessLogEntry {
    pub fn now(key: impl Into<String>, ip: impl Into<String>, user_agent: String, referer: Option<String>) -> Self {
        Self {
            key: key.into(),
            time: chrono::Utc::now().timestamp(),
            ip: ip.into(),
            user_agent,
            referer,
        }
    }
}
