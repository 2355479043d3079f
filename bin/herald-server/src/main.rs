//! Herald Server
//!
//! Periodically drains PENDING messages to the delivery endpoint and serves
//! the HTTP control surface.
//!
//! ## Configuration
//!
//! Read from `herald.toml` (or `HERALD_CONFIG`), then overridden by `HERALD_*`
//! environment variables. Run with `--example-config` to print a template.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HERALD_HTTP_PORT` | `8080` | HTTP API port |
//! | `HERALD_DATABASE_TYPE` | `postgres` | `postgres`, `sqlite` or `memory` |
//! | `HERALD_DATABASE_URL` | - | Database connection URL |
//! | `HERALD_REDIS_ENABLED` | `true` | Cache acknowledgments in Redis |
//! | `HERALD_REDIS_URL` | `redis://localhost:6379` | Redis URL |
//! | `HERALD_WEBHOOK_URL` | - | Delivery endpoint (required) |
//! | `HERALD_WORKER_BATCH_SIZE` | `2` | Messages per cycle |
//! | `HERALD_WORKER_INTERVAL_SECS` | `120` | Seconds between cycles |
//! | `HERALD_CACHE_TTL_SECS` | `86400` | Cache entry lifetime |
//! | `HERALD_SCHEDULER_AUTOSTART` | `true` | Start sending on boot |
//! | `RUST_LOG` | `info` | Log level |
//! | `LOG_FORMAT` | `text` | `json` or `text` |

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use herald_api::{create_router, AppState};
use herald_config::{AppConfig, DatabaseConfig, DatabaseType, RedisConfig};
use herald_dispatch::postgres::PostgresMessageRepository;
use herald_dispatch::sqlite::SqliteMessageRepository;
use herald_dispatch::{
    DeliveryClient, DeliveryConfig, DispatchWorker, InMemoryMessageRepository, MessageCache,
    MessageRepository, RedisMessageCache, Scheduler, WorkerConfig,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--example-config") {
        print!("{}", AppConfig::example_toml());
        return Ok(());
    }

    herald_common::logging::init_logging("herald-server");
    info!("Starting Herald Server");

    let config = AppConfig::load().context("failed to load configuration")?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let repository = create_repository(&config.database).await?;
    let cache = create_cache(&config.redis).await;

    let dispatch = &config.dispatch;
    let client = DeliveryClient::new(DeliveryConfig {
        endpoint_url: dispatch.webhook_url.clone(),
        connect_timeout: dispatch.connect_timeout(),
        request_timeout: dispatch.request_timeout(),
    })?;

    let worker = DispatchWorker::new(
        WorkerConfig {
            batch_size: dispatch.batch_size,
            cache_ttl: dispatch.cache_ttl(),
            cache_key_prefix: dispatch.cache_key_prefix.clone(),
        },
        repository.clone(),
        cache.clone(),
        Arc::new(client),
    );
    let scheduler = Arc::new(Scheduler::new(worker, dispatch.interval()));

    info!(
        endpoint = %dispatch.webhook_url,
        batch_size = dispatch.batch_size,
        interval_secs = dispatch.interval_secs,
        cache = cache.is_some(),
        "Dispatcher configured"
    );

    if dispatch.autostart {
        scheduler.start();
    } else {
        info!("Autostart disabled, waiting for POST /start");
    }

    let state = AppState {
        scheduler: scheduler.clone(),
        repository,
        cache,
        cache_prefix: dispatch.cache_key_prefix.clone(),
    };

    let app = create_router(state)
        .route("/metrics", get(move || std::future::ready(prometheus.render())))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = TcpListener::bind((config.http.host.as_str(), config.http.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.http.host, config.http.port))?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");

    let shutdown_scheduler = scheduler.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received...");
            shutdown_scheduler.stop();
        })
        .await?;

    info!("Herald Server shutdown complete");
    Ok(())
}

async fn create_repository(config: &DatabaseConfig) -> Result<Arc<dyn MessageRepository>> {
    let attempts = config.connect_attempts;
    let delay = config.connect_retry_delay();

    let repository: Arc<dyn MessageRepository> = match config.db_type {
        DatabaseType::Postgres => {
            let pool = connect_with_retry("PostgreSQL", attempts, delay, || {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_idle)
                    .connect(&config.url)
            })
            .await?;
            info!("Using PostgreSQL message store");
            Arc::new(PostgresMessageRepository::new(pool))
        }
        DatabaseType::Sqlite => {
            let options = SqliteConnectOptions::from_str(&config.url)
                .with_context(|| format!("invalid SQLite URL {}", config.url))?
                .create_if_missing(true);
            let pool = connect_with_retry("SQLite", attempts, delay, || {
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect_with(options.clone())
            })
            .await?;
            info!(url = %config.url, "Using SQLite message store");
            Arc::new(SqliteMessageRepository::new(pool))
        }
        DatabaseType::Memory => {
            warn!("Using in-memory message store, messages are lost on restart");
            Arc::new(InMemoryMessageRepository::new())
        }
    };

    repository.init_schema().await?;
    Ok(repository)
}

/// Retry a pool connection with a fixed delay between attempts
async fn connect_with_retry<T, F, Fut>(
    backend: &str,
    attempts: u32,
    delay: Duration,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(pool) => {
                info!(backend, attempt, "Connected to database");
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                warn!(backend, attempt, attempts, error = %e, "Database connection failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("could not connect to {} after {} attempts", backend, attempts)
                });
            }
        }
    }
}

async fn create_cache(config: &RedisConfig) -> Option<Arc<dyn MessageCache>> {
    if !config.enabled {
        info!("Redis cache disabled");
        return None;
    }

    match RedisMessageCache::connect(&config.url).await {
        Ok(cache) => {
            info!(url = %config.url, "Connected to Redis cache");
            Some(Arc::new(cache))
        }
        Err(e) => {
            warn!(url = %config.url, error = %e, "Redis unavailable, continuing without cache");
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
