// crates/server/src/routes/jobs.rs
//! Job and status-update endpoints.
//!
//! - POST /jobs                    - create a job (idempotent)
//! - GET  /jobs/{job_id}           - fetch one job
//! - POST /jobs/{job_id}/status    - push a status update
//! - GET  /jobs/{job_id}/updates   - page through stored updates

use std::sync::Arc;

use agent_status_core::{Job, NewJob, NewStatusUpdate, StatusUpdate, UpdateId};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthRole;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_job_created;
use crate::state::AppState;

/// Default page size for `GET /jobs/{job_id}/updates`.
pub const DEFAULT_UPDATES_LIMIT: i64 = 100;
/// Largest accepted `limit`.
pub const MAX_UPDATES_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct UpdatesQuery {
    pub after_id: Option<UpdateId>,
    pub limit: Option<i64>,
}

/// POST /api/jobs - Create a job, or return the existing one with that id.
async fn create_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewJob>,
) -> ApiResult<Json<Job>> {
    state.auth.authorize(AuthRole::JobCreator, &headers)?;

    let job_id = body
        .job_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let title = body.title.unwrap_or_default();
    let metadata = body.metadata.unwrap_or_default();

    let (job, created) = state.db.create_job(&job_id, &title, &metadata).await?;
    if created {
        record_job_created();
        tracing::info!(job_id = %job.id, title = %job.title, "Job created");
    } else {
        tracing::debug!(job_id = %job.id, "Job already exists");
    }
    Ok(Json(job))
}

/// GET /api/jobs/{job_id} - Fetch a job.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Job>> {
    state.auth.authorize(AuthRole::Any, &headers)?;

    state
        .db
        .get_job(&job_id)
        .await?
        .map(Json)
        .ok_or(ApiError::JobNotFound(job_id))
}

/// POST /api/jobs/{job_id}/status - Store a status update and fan it out.
async fn push_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<NewStatusUpdate>,
) -> ApiResult<Json<StatusUpdate>> {
    state.auth.authorize(AuthRole::StatusReporter, &headers)?;

    if !state.db.job_exists(&job_id).await? {
        return Err(ApiError::JobNotFound(job_id));
    }

    let record = state.hub.push(&job_id, update).await?;
    Ok(Json(record))
}

/// GET /api/jobs/{job_id}/updates - Stored updates after `after_id`, oldest first.
async fn list_updates(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<UpdatesQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<StatusUpdate>>> {
    state.auth.authorize(AuthRole::Any, &headers)?;

    let limit = query.limit.unwrap_or(DEFAULT_UPDATES_LIMIT);
    if !(1..=MAX_UPDATES_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_UPDATES_LIMIT}, got {limit}"
        )));
    }

    let updates = state
        .hub
        .history(&job_id, query.after_id, limit as usize)
        .await?;
    Ok(Json(updates))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/status", post(push_status))
        .route("/jobs/{job_id}/updates", get(list_updates))
}
