pub mod health;
pub mod imports;

use axum::Router;

use crate::state::AppState;

/// Build the job route tree.
///
/// ```text
/// /jobs/imports                                    list
/// /jobs/imports/{id}                               create (PUT), get, delete
/// /jobs/imports/{id}/cancel                        cancel (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs/imports", imports::router())
}
