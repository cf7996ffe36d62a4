// crates/server/src/routes/stream.rs
//! Server-Sent Events stream of a job's status updates.
//!
//! - GET /jobs/{job_id}/stream - history after the resume cursor, then live
//!
//! Each update is one event:
//!
//! ```text
//! id: <update id>
//! event: status
//! data: <StatusUpdate JSON>
//!
//! ```
//!
//! Clients resume with `?after_id=` or the standard `Last-Event-ID` header;
//! the query parameter wins when both are present.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use agent_status_core::{resolve_cursor, StatusUpdate};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::auth::AuthRole;
use crate::error::ApiResult;
use crate::metrics::record_stream_active;
use crate::state::AppState;

/// Interval between keep-alive comments on an idle stream.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const LAST_EVENT_ID: &str = "last-event-id";

/// Raw so that a malformed value replays from the start instead of
/// rejecting the request.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub after_id: Option<String>,
}

/// Decrements the active-stream gauge when the response body is dropped.
struct ActiveStream {
    job_id: String,
}

impl ActiveStream {
    fn open(job_id: &str) -> Self {
        record_stream_active(1.0);
        tracing::info!(job_id, "Event stream opened");
        Self {
            job_id: job_id.to_string(),
        }
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        record_stream_active(-1.0);
        tracing::info!(job_id = %self.job_id, "Event stream closed");
    }
}

/// Build the SSE event for one update.
pub fn status_event(update: &StatusUpdate) -> Option<Event> {
    match serde_json::to_string(update) {
        Ok(json) => Some(
            Event::default()
                .id(update.id.to_string())
                .event("status")
                .data(json),
        ),
        Err(e) => {
            tracing::error!(update_id = update.id, error = %e, "Failed to encode status update");
            None
        }
    }
}

/// GET /api/jobs/{job_id}/stream - Event stream of a job's updates.
///
/// The stream for a job nobody has created yet stays open and delivers the
/// job's updates once they exist.
async fn stream_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    state.auth.authorize(AuthRole::Any, &headers)?;

    let last_event_id = headers
        .get(LAST_EVENT_ID)
        .and_then(|v| v.to_str().ok());
    let after_id = resolve_cursor(query.after_id.as_deref(), last_event_id);

    let session = state
        .hub
        .open_stream(&job_id, after_id, state.shutdown.child_token());

    let stream = async_stream::stream! {
        let _active = ActiveStream::open(&job_id);
        let updates = session.into_stream();
        futures_util::pin_mut!(updates);

        while let Some(item) = updates.next().await {
            match item {
                Ok(update) => {
                    if let Some(event) = status_event(&update) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Event stream ended by store error");
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}

/// Build the stream router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs/{job_id}/stream", get(stream_status))
}
