use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use twingraph_api::background::BackgroundTasks;
use twingraph_api::config::ServerConfig;
use twingraph_api::router::build_app_router;
use twingraph_api::state::AppState;
use twingraph_import::blob::LocalBlobStore;
use twingraph_import::runner::{ImportJobRegistry, ImportJobRunner};
use twingraph_import::ImportServices;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "twingraph_api=debug,twingraph_import=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        bind_addr = %config.bind_addr,
        instance_id = %config.import.instance_id,
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = twingraph_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    twingraph_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    twingraph_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Import engine ---
    let blobs = Arc::new(LocalBlobStore::new(&config.import.blob_root));
    let services = ImportServices::postgres(pool.clone(), blobs);
    let runner = ImportJobRunner::new(services, &config.import, ImportJobRegistry::new());
    let background = BackgroundTasks::spawn(runner.clone(), &config.import);

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        runner: runner.clone(),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = config.bind_addr;
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    background
        .shutdown(config.shutdown_timeout)
        .await;

    // Runs still in flight keep their checkpoints; their leases lapse and
    // another instance resumes them.
    let in_flight = runner.registry().len();
    if in_flight > 0 {
        tracing::warn!(in_flight, "Abandoning running import jobs");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
