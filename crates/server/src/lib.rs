// crates/server/src/lib.rs
//! Agent status server library.
//!
//! Axum HTTP API over the status hub: producers create jobs and push status
//! updates, observers page through history or follow a job's SSE stream.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{AuthRole, AuthTokens};
pub use config::Cli;
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// `allowed_origins` of `None` allows any origin without credentials; an
/// explicit list allows exactly those origins with credentials.
pub fn create_app(state: Arc<AppState>, allowed_origins: Option<Vec<String>>) -> Router {
    Router::new()
        .merge(api_routes(state))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: Option<Vec<String>>) -> CorsLayer {
    let Some(origins) = allowed_origins else {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// ============================================================================
// Integration Tests
// ============================================================================
