//! Route definitions for the `/jobs/imports` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::imports;
use crate::state::AppState;

/// Routes mounted at `/jobs/imports`.
///
/// ```text
/// GET    /                -> list_import_jobs
/// PUT    /{id}            -> create_import_job
/// GET    /{id}            -> get_import_job
/// DELETE /{id}            -> delete_import_job
/// POST   /{id}/cancel     -> cancel_import_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(imports::list_import_jobs))
        .route(
            "/{id}",
            get(imports::get_import_job)
                .put(imports::create_import_job)
                .delete(imports::delete_import_job),
        )
        .route("/{id}/cancel", post(imports::cancel_import_job))
}
