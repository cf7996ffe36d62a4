// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use agent_status_core::{HubConfig, StatusHub};
use agent_status_db::Database;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthTokens;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Database handle for job lookups and creation.
    pub db: Database,
    /// Update log + broadcaster shared by producers and stream sessions.
    pub hub: StatusHub,
    /// Bearer tokens for producer endpoints.
    pub auth: AuthTokens,
    /// Cancelled on server shutdown; every stream session holds a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    ///
    /// The hub's update log is the same SQLite database.
    pub fn new(db: Database, config: HubConfig, auth: AuthTokens) -> Arc<Self> {
        let hub = StatusHub::new(Arc::new(db.clone()), config);
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            hub,
            auth,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_starts_running() {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, HubConfig::default(), AuthTokens::default());

        assert!(state.uptime_secs() < 5);
        assert!(!state.shutdown.is_cancelled());
        assert_eq!(state.hub.broadcaster().job_count(), 0);
    }
}
