use crate::limiter::{RateLimits, RateQuota};
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub targets: TargetConfig,
    #[serde(skip)]
    pub rate_limits: RateLimitConfig,
    pub log_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Fixed redirect targets for the static routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Destination of `/` and base for sitemap/ads targets
    pub home_url: String,
    /// Destination for unknown short keys
    pub not_found_url: String,
}

impl TargetConfig {
    pub fn sitemap_xml(&self) -> String {
        format!("{}/sitemap.xml", self.home_url)
    }

    pub fn sitemap_txt(&self) -> String {
        format!("{}/sitemap.txt", self.home_url)
    }

    pub fn ads_txt(&self) -> String {
        format!("{}/ads.txt", self.home_url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateLimitConfig {
    pub limits: RateLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                backend: DatabaseBackend::Sqlite,
                url: "sqlite://./catlink.db".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            targets: TargetConfig {
                home_url: "https://www.g2022cyk.top".to_string(),
                not_found_url: "https://www.g2022cyk.top/404.html".to_string(),
            },
            rate_limits: RateLimitConfig::default(),
            log_queue_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => match backend {
                DatabaseBackend::Sqlite => defaults.database.url.clone(),
                DatabaseBackend::Postgres => assemble_postgres_url()?,
            },
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| defaults.server.host.clone());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| defaults.server.port.to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let home_url = std::env::var("HOME_URL")
            .unwrap_or_else(|_| defaults.targets.home_url.clone());
        let home_url = home_url.trim_end_matches('/').to_string();
        let not_found_url = std::env::var("NOT_FOUND_URL")
            .unwrap_or_else(|_| format!("{}/404.html", home_url));

        let rate_limits = rate_limits_from_env()?;

        let log_queue_capacity = std::env::var("LOG_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.log_queue_capacity);

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
            },
            server: ServerConfig { host, port },
            targets: TargetConfig {
                home_url,
                not_found_url,
            },
            rate_limits: RateLimitConfig {
                limits: rate_limits,
            },
            log_queue_capacity,
        })
    }
}

/// Build a Postgres DSN from discrete parts, carrying optional client
/// certificate material for the store connection.
fn assemble_postgres_url() -> anyhow::Result<String> {
    let host = std::env::var("DB_HOST").context("DB_HOST must be set for postgres backend")?;
    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let user = std::env::var("DB_USER").context("DB_USER must be set for postgres backend")?;
    let pass = std::env::var("DB_PASS").context("DB_PASS must be set for postgres backend")?;
    let name = std::env::var("DB_NAME").context("DB_NAME must be set for postgres backend")?;

    let mut url = format!("postgres://{user}:{pass}@{host}:{port}/{name}");

    let mut params = Vec::new();
    if let Ok(ca) = std::env::var("DB_SSL_CA") {
        params.push(format!("sslrootcert={ca}"));
        params.push("sslmode=verify-full".to_string());
    }
    if let Ok(cert) = std::env::var("DB_SSL_CERT") {
        params.push(format!("sslcert={cert}"));
    }
    if let Ok(key) = std::env::var("DB_SSL_KEY") {
        params.push(format!("sslkey={key}"));
    }
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }

    Ok(url)
}

fn rate_limits_from_env() -> anyhow::Result<RateLimits> {
    let defaults = RateLimits::default();

    let per_minute = env_u32("RATE_LIMIT_PER_MINUTE")?;
    let per_hour = env_u32("RATE_LIMIT_PER_HOUR")?;
    let redirect_per_minute = env_u32("RATE_LIMIT_REDIRECT_PER_MINUTE")?;
    let home_per_minute = env_u32("RATE_LIMIT_HOME_PER_MINUTE")?;

    let base_minute = per_minute.map(RateQuota::per_minute);
    let base_hour = per_hour.map(RateQuota::per_hour);

    let build = |minute_override: Option<u32>, default: &[RateQuota]| -> Vec<RateQuota> {
        let mut quotas = Vec::new();
        quotas.push(
            minute_override
                .map(RateQuota::per_minute)
                .or(base_minute)
                .unwrap_or(default[0]),
        );
        quotas.push(base_hour.unwrap_or(default[1]));
        quotas
    };

    Ok(RateLimits {
        redirect: build(redirect_per_minute, &defaults.redirect),
        home: build(home_per_minute, &defaults.home),
        r#static: build(None, &defaults.r#static),
    })
}

fn env_u32(name: &str) -> anyhow::Result<Option<u32>> {
    match std::env::var(name) {
        Ok(v) => {
            let parsed = v
                .parse::<u32>()
                .with_context(|| format!("{name} must be an unsigned integer"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
