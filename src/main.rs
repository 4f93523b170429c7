use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use catlink::access_log::AccessLogWriter;
use catlink::config::{Config, DatabaseBackend};
use catlink::guard::AbuseGuard;
use catlink::limiter::RateLimiter;
use catlink::redirect::{create_router, AppState};
use catlink::storage::{PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, 5).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(PostgresStorage::new(&config.database.url).await?)
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let log_writer = Arc::new(AccessLogWriter::new(
        Arc::clone(&storage),
        config.log_queue_capacity,
    ));

    let state = Arc::new(AppState {
        storage,
        guard: Arc::new(AbuseGuard::new()),
        limiter: Arc::new(RateLimiter::new(config.rate_limits.limits.clone())),
        log_writer: Arc::clone(&log_writer),
        targets: config.targets.clone(),
    });

    let router = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Redirect server listening on http://{}", addr);
    info!("   - Home target: {}", config.targets.home_url);
    info!("   - Not-found target: {}", config.targets.not_found_url);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router is gone; drain whatever the request path queued.
    match Arc::into_inner(log_writer) {
        Some(writer) => writer.shutdown().await,
        None => tracing::warn!("access log writer still shared at shutdown, skipping drain"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
