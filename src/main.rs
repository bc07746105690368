//! StatusHub Server: user presence tracking
//!
//! Main entry point that wires all crates together and runs the status
//! engine until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use statushub_cache::CacheManager;
use statushub_cache::keys::STATUS_CACHE;
use statushub_cluster::PresenceHub;
use statushub_core::config::AppConfig;
use statushub_core::config::logging::LogFormat;
use statushub_core::events::InvalidationTopic;
use statushub_database::{DatabasePool, StatusRepository};
use statushub_service::{StatusCache, StatusConfigHandle, StatusService};
use statushub_worker::{CronScheduler, DndExpiryJob};

/// Command line options.
#[derive(Debug, Parser)]
#[command(name = "statushub-server", version, about = "User presence tracking server")]
struct Cli {
    /// Directory holding `default.toml` and the environment overlays
    #[arg(long, env = "STATUSHUB_CONFIG_DIR", default_value = "config")]
    config_dir: String,

    /// Environment overlay to load on top of the defaults
    #[arg(long, env = "STATUSHUB_ENV", default_value = "development")]
    env: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config_dir, &cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(config_dir = %cli.config_dir, env = %cli.env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting StatusHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    tracing::info!("Connecting to database...");
    let db_pool = DatabasePool::connect(&config.database)
        .await
        .context("Database connection failed")?;

    tracing::info!("Running database migrations...");
    statushub_database::migration::run_migrations(db_pool.pool())
        .await
        .context("Migration failed")?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(StatusRepository::new(db_pool.pool().clone()));

    // ── Step 2: Initialize cache ─────────────────────────────────
    tracing::info!(provider = %config.cache.provider, "Initializing cache...");
    let caches = CacheManager::new(&config.cache)
        .await
        .context("Cache init failed")?;
    let status_cache = caches
        .build_cache(STATUS_CACHE, InvalidationTopic::Status)
        .context("Status cache init failed")?;
    tracing::info!("Cache initialized");

    // ── Step 3: Cluster bus + presence fan-out ───────────────────
    tracing::info!(provider = %config.cluster.provider, "Joining cluster bus...");
    let bus = statushub_cluster::connect(&config.cluster)
        .await
        .context("Cluster bus init failed")?;
    let presence = PresenceHub::new(config.cluster.presence_buffer_size);
    tracing::info!(node_id = %bus.node_id(), "Cluster bus ready");

    // ── Step 4: Status engine ────────────────────────────────────
    let status_config =
        StatusConfigHandle::new(config.status.clone()).context("Invalid status configuration")?;
    let service = StatusService::new(
        store,
        StatusCache::new(status_cache),
        Arc::clone(&bus),
        presence,
        status_config.subscribe(),
        Arc::new(mockable::DefaultClock),
    );
    service.register_cluster_handlers(&caches);
    tracing::info!(
        enabled = config.status.enabled,
        away_timeout_seconds = config.status.away_timeout_seconds,
        "Status engine ready"
    );

    // ── Step 5: Recurring jobs ───────────────────────────────────
    let mut scheduler = if config.worker.enabled {
        let scheduler = CronScheduler::new().await.context("Scheduler init failed")?;
        scheduler
            .register(
                Arc::new(DndExpiryJob::new(service.clone())),
                Duration::from_secs(config.status.dnd_expiry_interval_seconds),
            )
            .await
            .context("DND expiry job registration failed")?;
        scheduler.start().await.context("Scheduler start failed")?;
        Some(scheduler)
    } else {
        tracing::info!("Background worker disabled");
        None
    };

    // ── Step 6: Health checks ────────────────────────────────────
    let db_ok = db_pool.health_check().await.unwrap_or(false);
    let cache_ok = caches.health_check().await.unwrap_or(false);
    if db_ok && cache_ok {
        tracing::info!("StatusHub server running");
    } else {
        tracing::warn!(database = db_ok, cache = cache_ok, "StatusHub running degraded");
    }

    // ── Step 7: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler shutdown failed");
        }
    }
    if let Err(e) = caches.purge_all().await {
        tracing::warn!(error = %e, "Cache purge on shutdown failed");
    }
    db_pool.close().await;

    tracing::info!("StatusHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
