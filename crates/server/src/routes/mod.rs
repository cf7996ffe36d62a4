// crates/server/src/routes/mod.rs
//! API route handlers for the agent status server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod stream;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/jobs - Create a job (creator or admin token)
/// - GET  /api/jobs/{job_id} - Fetch a job
/// - POST /api/jobs/{job_id}/status - Push a status update (reporter or admin token)
/// - GET  /api/jobs/{job_id}/updates - Stored updates, paged by `after_id`/`limit`
/// - GET  /api/jobs/{job_id}/stream - SSE stream: history, then live updates
/// - GET  /metrics - Prometheus metrics (no /api prefix)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", stream::router())
        .merge(metrics::router())
        .with_state(state)
}
