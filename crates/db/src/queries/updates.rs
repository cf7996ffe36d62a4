// crates/db/src/queries/updates.rs
//! The `updates` table: append-one and read-range over the status log.

use agent_status_core::{
    NewStatusUpdate, StatusError, StatusResult, StatusUpdate, UpdateId, UpdateLog,
};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::Row;

use super::{decode_json_map, decode_ts, encode_ts};
use crate::{Database, DbResult};

/// An `updates` row as stored (payload and timestamp still encoded).
#[derive(Debug, Clone)]
pub struct UpdateRow {
    pub id: i64,
    pub job_id: String,
    pub status: String,
    pub stage: Option<String>,
    pub progress: Option<i64>,
    pub payload: String,
    pub ts: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for UpdateRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            status: row.try_get("status")?,
            stage: row.try_get("stage")?,
            progress: row.try_get("progress")?,
            payload: row.try_get("payload")?,
            ts: row.try_get("ts")?,
        })
    }
}

impl TryFrom<UpdateRow> for StatusUpdate {
    type Error = sqlx::Error;

    fn try_from(row: UpdateRow) -> Result<Self, Self::Error> {
        Ok(StatusUpdate {
            payload: decode_json_map("payload", &row.payload)?,
            ts: decode_ts("ts", &row.ts)?,
            id: row.id,
            job_id: row.job_id,
            status: row.status,
            stage: row.stage,
            progress: row.progress,
        })
    }
}

impl Database {
    /// Store one update and return it with its assigned id.
    ///
    /// Single statement, so the row either exists with an id or was never
    /// written. Callers validate `update` first.
    pub async fn insert_update(
        &self,
        job_id: &str,
        update: &NewStatusUpdate,
    ) -> DbResult<StatusUpdate> {
        // Stored text keeps microseconds; truncate so the returned record
        // compares equal to what a later read yields.
        let ts = Utc::now().trunc_subsecs(6);
        let payload = update.payload_or_empty();

        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO updates (job_id, status, stage, progress, payload, ts)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(job_id)
        .bind(&update.status)
        .bind(update.stage.as_deref())
        .bind(update.progress)
        .bind(serde_json::to_string(&payload)?)
        .bind(encode_ts(&ts))
        .fetch_one(self.pool())
        .await?;

        Ok(StatusUpdate {
            id: row.0,
            job_id: job_id.to_string(),
            status: update.status.clone(),
            stage: update.stage.clone(),
            progress: update.progress,
            payload,
            ts,
        })
    }

    /// Updates of `job_id` with `id > after_id`, ascending, at most `limit`.
    pub async fn select_updates(
        &self,
        job_id: &str,
        after_id: Option<UpdateId>,
        limit: usize,
    ) -> DbResult<Vec<StatusUpdate>> {
        let rows: Vec<UpdateRow> = sqlx::query_as(
            r#"SELECT id, job_id, status, stage, progress, payload, ts
               FROM updates
               WHERE job_id = ? AND id > ?
               ORDER BY id ASC
               LIMIT ?"#,
        )
        .bind(job_id)
        // ids start at 1, so 0 means "from the oldest"
        .bind(after_id.unwrap_or(0))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(StatusUpdate::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Total number of stored updates for a job.
    pub async fn count_updates(&self, job_id: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM updates WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl UpdateLog for Database {
    async fn append(&self, job_id: &str, update: &NewStatusUpdate) -> StatusResult<StatusUpdate> {
        update.validate()?;
        self.insert_update(job_id, update).await.map_err(|e| {
            tracing::warn!(job_id, error = %e, "Failed to append status update");
            StatusError::store(e)
        })
    }

    async fn read_after(
        &self,
        job_id: &str,
        after_id: Option<UpdateId>,
        limit: usize,
    ) -> StatusResult<Vec<StatusUpdate>> {
        self.select_updates(job_id, after_id, limit)
            .await
            .map_err(StatusError::store)
    }
}
