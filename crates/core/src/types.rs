// crates/core/src/types.rs
//! Job and status-update records shared by the update log, the broadcaster
//! and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StatusError, StatusResult};

/// Opaque JSON object used for job `metadata` and update `payload`.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Store-assigned update id. Unique across all jobs and strictly increasing.
pub type UpdateId = i64;

/// Inclusive bounds for `progress`.
pub const PROGRESS_MIN: i64 = 0;
pub const PROGRESS_MAX: i64 = 100;

// =============================================================================
// Stored records
// =============================================================================

/// A tracked unit of work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub metadata: JsonMap,
    pub created_at: DateTime<Utc>,
}

/// A point-in-time status of a job, as stored in the update log.
///
/// `stage` and `progress` serialize as `null` when absent so clients can tell
/// "no progress reported" apart from `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: UpdateId,
    pub job_id: String,
    pub status: String,
    pub stage: Option<String>,
    pub progress: Option<i64>,
    pub payload: JsonMap,
    pub ts: DateTime<Utc>,
}

// =============================================================================
// Inputs
// =============================================================================

/// Request to create a job. Every field is optional; a missing id is generated
/// by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
}

/// A status update before the store assigns its id and timestamp.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewStatusUpdate {
    pub status: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub payload: Option<JsonMap>,
}

impl NewStatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_progress(mut self, progress: i64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_payload(mut self, payload: JsonMap) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Reject values the log must never store.
    pub fn validate(&self) -> StatusResult<()> {
        if let Some(progress) = self.progress {
            if !(PROGRESS_MIN..=PROGRESS_MAX).contains(&progress) {
                return Err(StatusError::validation(
                    "progress",
                    format!("must be between {PROGRESS_MIN} and {PROGRESS_MAX}, got {progress}"),
                ));
            }
        }
        Ok(())
    }

    /// Payload to persist; a missing payload is stored as `{}`.
    pub fn payload_or_empty(&self) -> JsonMap {
        self.payload.clone().unwrap_or_default()
    }
}
