//! Handlers for the `/jobs/imports` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use twingraph_core::error::CoreError;
use twingraph_core::import_job::{validate_job_id, ImportJobRecord, NewImportJob};
use twingraph_core::options::ImportJobOptions;
use twingraph_db::models::import_job::ImportJobListQuery;
use twingraph_import::store::{CheckpointStore, ImportJobStore, JobLockStore};

use crate::error::{AppError, AppResult};
use crate::response::PagedResponse;
use crate::state::AppState;

/// Page size when the caller passes no `limit`.
const DEFAULT_PAGE_SIZE: i64 = 50;

/// Upper bound on `limit`.
const MAX_PAGE_SIZE: i64 = 100;

/// Request body for `PUT /jobs/imports/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImportJob {
    pub input_blob_uri: String,
    pub output_blob_uri: String,
    #[serde(default)]
    pub options: ImportJobOptions,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_job(state: &AppState, id: &str) -> AppResult<ImportJobRecord> {
    state
        .services()
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "ImportJob",
                id: id.to_string(),
            })
        })
}

fn require_uri(name: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{name} must not be empty")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// PUT /jobs/imports/{id}
///
/// Create an import job and start it on this instance. Returns 201 with the
/// job record. If another instance grabs the lease first, the job is left
/// for the resumption coordinator.
pub async fn create_import_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CreateImportJob>,
) -> AppResult<impl IntoResponse> {
    validate_job_id(&id)?;
    require_uri("inputBlobUri", &input.input_blob_uri)?;
    require_uri("outputBlobUri", &input.output_blob_uri)?;
    input.options.validate()?;

    let new_job = NewImportJob {
        id: id.clone(),
        input_blob_uri: input.input_blob_uri,
        output_blob_uri: input.output_blob_uri,
        options: input.options,
        retention_hours: state.config.import.job_retention_hours,
    };
    let job = state
        .services()
        .jobs
        .create(&new_job)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict(format!(
                "Import job '{id}' already exists"
            )))
        })?;

    tracing::info!(
        job_id = %job.id,
        input_blob_uri = %job.input_blob_uri,
        "Import job created",
    );

    match state.runner.try_start(job.clone()).await {
        Ok(Some(_)) => tracing::debug!(job_id = %job.id, "Import job started"),
        Ok(None) => {
            tracing::info!(job_id = %job.id, "Import job lease taken, leaving it to the coordinator");
        }
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "Could not start import job, leaving it to the coordinator");
        }
    }

    Ok((StatusCode::CREATED, Json(job)))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /jobs/imports
///
/// List import jobs, newest first. Supports `limit` and `offset`.
pub async fn list_import_jobs(
    State(state): State<AppState>,
    Query(params): Query<ImportJobListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let jobs = state.services().jobs.list(limit, offset).await?;
    let next_link = (jobs.len() as i64 == limit)
        .then(|| format!("/jobs/imports?limit={limit}&offset={}", offset + limit));

    Ok(Json(PagedResponse {
        value: jobs,
        next_link,
    }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /jobs/imports/{id}
pub async fn get_import_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, &id).await?;
    Ok(Json(job))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /jobs/imports/{id}/cancel
///
/// Request cancellation of a running job. The instance running it stops at
/// the next batch boundary. Returns 400 if the job already finished.
pub async fn cancel_import_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, &id).await?;
    let jobs = &state.services().jobs;

    if job.status.is_terminal() || !jobs.request_cancel(&id).await? {
        return Err(AppError::BadRequest(format!(
            "Import job '{id}' is {} and cannot be cancelled",
            job.status.as_str()
        )));
    }

    let local = state.runner.registry().cancel(&id);
    tracing::info!(job_id = %id, local, "Import job cancel requested");

    let job = find_job(&state, &id).await?;
    Ok(Json(job))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /jobs/imports/{id}
///
/// Delete a job with its checkpoint and lease. A running job is cancelled
/// first. Returns 204.
pub async fn delete_import_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, &id).await?;
    let services = state.services();

    if !job.status.is_terminal() {
        services.jobs.request_cancel(&id).await?;
        state.runner.registry().cancel(&id);
    }

    services.checkpoints.delete(&id).await?;
    services.jobs.delete(&id).await?;
    services.locks.release(&id).await?;

    tracing::info!(job_id = %id, "Import job deleted");
    Ok(StatusCode::NO_CONTENT)
}
