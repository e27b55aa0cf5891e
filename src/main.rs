//! SEO Content Cache server
//!
//! Serves generated landing page copy over HTTP and keeps it current with a
//! background regeneration task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seo_content_cache::api::create_router;
use seo_content_cache::cache::{MemoryStore, PostgresStore, SharedClock, SharedStore, SystemClock};
use seo_content_cache::generation::TemplateGenerator;
use seo_content_cache::tasks::{Regenerator, WorkerConfig};
use seo_content_cache::{spawn_regeneration_task, AppState, Config};

/// Main entry point for the content cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the content store (Postgres when `DATABASE_URL` is set)
/// 4. Start the background regeneration task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seo_content_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SEO Content Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: default_ttl={}s, content_version={}, port={}, sweep_interval={}s",
        config.default_ttl, config.content_version, config.server_port, config.sweep_interval
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let store = open_store(&config, clock.clone()).await?;

    let (state, queue, requests) = AppState::from_store(store, clock.clone(), &config);

    let regenerator = Regenerator::new(
        state.store.clone(),
        Arc::new(TemplateGenerator::new(config.content_version)),
        state.stats.clone(),
        clock,
        WorkerConfig::from_config(&config),
    );
    let worker_handle = spawn_regeneration_task(regenerator, queue, requests);
    info!("Background regeneration task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(worker_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn open_store(config: &Config, clock: SharedClock) -> anyhow::Result<SharedStore> {
    let policy = config.regeneration_policy();

    match &config.database_url {
        Some(url) => {
            let pool = PostgresStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            let store = PostgresStore::new(pool, policy, clock);
            store
                .run_migrations()
                .await
                .context("failed to run migrations")?;
            info!("Postgres content store ready");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, content is kept in memory only");
            Ok(Arc::new(MemoryStore::new(policy, clock)))
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the regeneration task and allows graceful shutdown.
async fn shutdown_signal(worker_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    worker_handle.abort();
    warn!("Regeneration task aborted");
}
