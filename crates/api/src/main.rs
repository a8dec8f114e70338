use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use domain::services::LocationIngestor;
use geo_tracker::config::Config;
use geo_tracker::jobs::{JobScheduler, PollDevicesJob, PoolMetricsJob};
use geo_tracker::services::GpsPortalClient;
use geo_tracker::{app, middleware};
use persistence::db::DatabaseConfig;
use persistence::repositories::{DeviceRepository, LocationRepository, TrackerSettingsRepository};
use tracing::{error, info};

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::load()?);

    middleware::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Geo Tracker v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout_secs: config.database.connect_timeout_secs,
        idle_timeout_secs: config.database.idle_timeout_secs,
    })
    .await?;

    if config.migrations.run_on_start {
        info!("Running database migrations...");
        persistence::db::run_migrations(&pool).await?;
        info!("Migrations completed");
    }

    let devices = Arc::new(DeviceRepository::new(pool.clone()));
    let fixes = Arc::new(LocationRepository::new(pool.clone()));
    let settings = Arc::new(TrackerSettingsRepository::new(pool.clone()));
    let provider = Arc::new(GpsPortalClient::new(&config.portal)?);

    let ingestor = Arc::new(LocationIngestor::new(
        provider,
        devices.clone(),
        fixes,
        devices.clone(),
    ));

    let mut scheduler = JobScheduler::new();
    scheduler.register(PollDevicesJob::new(
        devices,
        ingestor,
        settings,
        &config.poller,
    ));
    scheduler.register(PoolMetricsJob::new(pool.clone()));
    scheduler.start();

    let app = app::create_app(config.clone(), pool);
    let addr = config.socket_addr()?;
    info!("Ops server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;

    info!("Geo Tracker stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
