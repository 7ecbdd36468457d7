#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use twingraph_api::config::ServerConfig;
use twingraph_api::router::build_app_router;
use twingraph_api::state::AppState;
use twingraph_import::blob::LocalBlobStore;
use twingraph_import::config::ImportConfig;
use twingraph_import::runner::{ImportJobRegistry, ImportJobRunner};
use twingraph_import::ImportServices;

/// Config for router tests: one allowed origin, fast cancel polling and
/// blobs resolved under `blob_root`.
pub fn test_config(blob_root: &Path) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origins: vec![TEST_ORIGIN.to_string()],
        request_timeout: Duration::from_secs(30),
        shutdown_timeout: Duration::from_secs(5),
        import: ImportConfig {
            instance_id: "test-instance".to_string(),
            cancel_poll_interval: Duration::from_millis(50),
            blob_root: blob_root.to_path_buf(),
            ..ImportConfig::default()
        },
    }
}

pub const TEST_ORIGIN: &str = "https://twins.example.com";

/// Build the full application router with all middleware layers, using the
/// given database pool. Jobs started through it find no input blobs.
pub fn build_test_app(pool: PgPool) -> Router {
    let missing = std::env::temp_dir().join("twingraph-api-tests-no-blobs");
    build_test_app_with_blobs(pool, &missing)
}

/// Same as [`build_test_app`], with blobs stored under `blob_root`.
pub fn build_test_app_with_blobs(pool: PgPool, blob_root: &Path) -> Router {
    build_test_app_with_config(pool, test_config(blob_root))
}

/// Router over `config`, using the production [`build_app_router`].
pub fn build_test_app_with_config(pool: PgPool, config: ServerConfig) -> Router {
    let services = ImportServices::postgres(
        pool.clone(),
        Arc::new(LocalBlobStore::new(&config.import.blob_root)),
    );
    let runner = ImportJobRunner::new(services, &config.import, ImportJobRegistry::new());

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        runner,
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
