//! Headless import instance: resumes orphaned import jobs and purges expired
//! ones, without serving HTTP.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twingraph_import::blob::LocalBlobStore;
use twingraph_import::config::ImportConfig;
use twingraph_import::coordinator::ImportResumptionCoordinator;
use twingraph_import::retention;
use twingraph_import::runner::{ImportJobRegistry, ImportJobRunner};
use twingraph_import::ImportServices;

/// How long to wait for each loop after the shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "twingraph_worker=debug,twingraph_import=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ImportConfig::from_env();
    tracing::info!(instance_id = %config.instance_id, "Import worker starting");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = twingraph_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    twingraph_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let services = ImportServices::postgres(pool, Arc::new(LocalBlobStore::new(&config.blob_root)));
    let jobs = services.jobs.clone();
    let runner = ImportJobRunner::new(services, &config, ImportJobRegistry::new());
    let registry = runner.registry().clone();

    let cancel = CancellationToken::new();
    let coordinator = ImportResumptionCoordinator::new(runner, config.resume_interval);
    let coordinator_cancel = cancel.clone();
    let coordinator_handle = tokio::spawn(async move {
        coordinator.run(coordinator_cancel).await;
    });
    let retention_handle = tokio::spawn(retention::run(jobs, cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    for handle in [coordinator_handle, retention_handle] {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
    }
    if !registry.is_empty() {
        tracing::warn!(in_flight = registry.len(), "Abandoning running import jobs");
    }
    tracing::info!("Import worker stopped");
}
