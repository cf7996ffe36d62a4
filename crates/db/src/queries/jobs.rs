// crates/db/src/queries/jobs.rs
//! Job rows: idempotent creation and lookup.

use agent_status_core::{Job, JsonMap};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::Row;

use super::{decode_json_map, decode_ts, encode_ts};
use crate::{Database, DbResult};

/// A `jobs` row as stored (JSON and timestamp still encoded).
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub title: String,
    pub metadata: String,
    pub created_at: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for JobRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            metadata: decode_json_map("metadata", &row.metadata)?,
            created_at: decode_ts("created_at", &row.created_at)?,
            id: row.id,
            title: row.title,
        })
    }
}

impl Database {
    /// Insert a job unless one with the same id already exists.
    ///
    /// Returns `true` if a row was written. An existing job is left untouched,
    /// including its title and metadata.
    pub async fn insert_job(
        &self,
        job_id: &str,
        title: &str,
        metadata: &JsonMap,
        created_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let metadata = serde_json::to_string(metadata)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO jobs (id, title, metadata, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(title)
        .bind(metadata)
        .bind(encode_ts(&created_at))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Create the job if needed and return the stored record.
    ///
    /// The boolean is `true` when this call created the job.
    pub async fn create_job(
        &self,
        job_id: &str,
        title: &str,
        metadata: &JsonMap,
    ) -> DbResult<(Job, bool)> {
        let created = self
            .insert_job(job_id, title, metadata, Utc::now().trunc_subsecs(6))
            .await?;
        let row: JobRow = sqlx::query_as(
            "SELECT id, title, metadata, created_at FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_one(self.pool())
        .await?;
        Ok((Job::try_from(row)?, created))
    }

    /// Look up a job by id.
    pub async fn get_job(&self, job_id: &str) -> DbResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(
            "SELECT id, title, metadata, created_at FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Job::try_from).transpose()?)
    }

    pub async fn job_exists(&self, job_id: &str) -> DbResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata(value: serde_json::Value) -> JsonMap {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_job_returns_stored_record() {
        let db = Database::new_in_memory().await.unwrap();
        let meta = metadata(json!({"owner": "ci", "attempt": 1}));

        let (job, created) = db.create_job("J1", "Nightly build", &meta).await.unwrap();
        assert!(created);
        assert_eq!(job.id, "J1");
        assert_eq!(job.title, "Nightly build");
        assert_eq!(job.metadata, meta);

        let fetched = db.get_job("J1").await.unwrap().expect("job should exist");
        assert_eq!(fetched, job);
    }

    #[tokio::test]
    async fn test_create_job_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        let (first, created) = db
            .create_job("J1", "first", &JsonMap::new())
            .await
            .unwrap();
        assert!(created);

        let (second, created) = db
            .create_job("J1", "second", &metadata(json!({"ignored": true})))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second, first, "existing job must not be overwritten");
    }

    #[tokio::test]
    async fn test_get_missing_job() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db.get_job("nope").await.unwrap().is_none());
        assert!(!db.job_exists("nope").await.unwrap());

        db.create_job("J1", "", &JsonMap::new()).await.unwrap();
        assert!(db.job_exists("J1").await.unwrap());
    }
}
