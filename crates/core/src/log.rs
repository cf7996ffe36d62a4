// crates/core/src/log.rs
//! Durable, ordered, append-only update log.
//!
//! `UpdateLog` is the persistence boundary the hub and stream sessions talk
//! to. `agent-status-db` implements it on SQLite; `MemoryUpdateLog` is the
//! process-local implementation used by tests and embedders that do not need
//! durability.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StatusResult;
use crate::types::{NewStatusUpdate, StatusUpdate, UpdateId};

/// Append-one / read-range contract of the update store.
///
/// Implementations must assign ids that are unique across all jobs and
/// strictly increasing in append order, and must make `append` atomic: either
/// the record exists with an id or nothing was written.
#[async_trait]
pub trait UpdateLog: Send + Sync + 'static {
    /// Validate and store `update` for `job_id`, returning the stored record.
    async fn append(&self, job_id: &str, update: &NewStatusUpdate) -> StatusResult<StatusUpdate>;

    /// Up to `limit` updates of `job_id` with `id > after_id` (or from the
    /// oldest when `after_id` is `None`), ascending by id.
    async fn read_after(
        &self,
        job_id: &str,
        after_id: Option<UpdateId>,
        limit: usize,
    ) -> StatusResult<Vec<StatusUpdate>>;
}

#[derive(Debug, Default)]
struct MemoryLogInner {
    last_id: UpdateId,
    updates: Vec<StatusUpdate>,
}

/// In-process `UpdateLog`. Ids start at 1 and are shared by all jobs.
#[derive(Debug, Default)]
pub struct MemoryUpdateLog {
    inner: Mutex<MemoryLogInner>,
}

impl MemoryUpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored updates across all jobs.
    pub fn len(&self) -> usize {
        self.lock().updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLogInner> {
        self.inner.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned in memory update log; recovering");
            PoisonError::into_inner(e)
        })
    }
}

#[async_trait]
impl UpdateLog for MemoryUpdateLog {
    async fn append(&self, job_id: &str, update: &NewStatusUpdate) -> StatusResult<StatusUpdate> {
        update.validate()?;

        let mut inner = self.lock();
        inner.last_id += 1;
        let record = StatusUpdate {
            id: inner.last_id,
            job_id: job_id.to_string(),
            status: update.status.clone(),
            stage: update.stage.clone(),
            progress: update.progress,
            payload: update.payload_or_empty(),
            ts: Utc::now(),
        };
        inner.updates.push(record.clone());
        Ok(record)
    }

    async fn read_after(
        &self,
        job_id: &str,
        after_id: Option<UpdateId>,
        limit: usize,
    ) -> StatusResult<Vec<StatusUpdate>> {
        let inner = self.lock();
        // `updates` is in id order already, so the first `limit` matches are
        // the oldest ones.
        Ok(inner
            .updates
            .iter()
            .filter(|u| u.job_id == job_id && after_id.map_or(true, |after| u.id > after))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusError;

    #[tokio::test]
    async fn test_append_assigns_global_increasing_ids() {
        let log = MemoryUpdateLog::new();
        let a = log.append("J1", &NewStatusUpdate::new("running")).await.unwrap();
        let b = log.append("J2", &NewStatusUpdate::new("queued")).await.unwrap();
        let c = log.append("J1", &NewStatusUpdate::new("done")).await.unwrap();

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn test_read_after_filters_orders_and_limits() {
        let log = MemoryUpdateLog::new();
        for i in 0..6 {
            let job = if i % 2 == 0 { "J1" } else { "J2" };
            log.append(job, &NewStatusUpdate::new(format!("s{i}")))
                .await
                .unwrap();
        }

        let all: Vec<_> = log
            .read_after("J1", None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(all, vec![1, 3, 5]);

        let after: Vec<_> = log
            .read_after("J1", Some(1), 1)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(after, vec![3]);

        assert!(log.read_after("J1", Some(5), 10).await.unwrap().is_empty());
        assert!(log.read_after("missing", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_progress_is_not_stored() {
        let log = MemoryUpdateLog::new();
        let err = log
            .append("J1", &NewStatusUpdate::new("bad").with_progress(101))
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::Validation { .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_absent_and_zero_progress_round_trip() {
        let log = MemoryUpdateLog::new();
        log.append("J1", &NewStatusUpdate::new("a")).await.unwrap();
        log.append("J1", &NewStatusUpdate::new("b").with_progress(0))
            .await
            .unwrap();

        let rows = log.read_after("J1", None, 10).await.unwrap();
        assert_eq!(rows[0].progress, None);
        assert_eq!(rows[1].progress, Some(0));
    }
}
