// crates/core/src/hub.rs
//! Producer/consumer entry point tying the update log to the broadcaster.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broadcaster::{BroadcastConfig, Broadcaster};
use crate::error::StatusResult;
use crate::log::UpdateLog;
use crate::session::{StreamSession, DEFAULT_HISTORY_PAGE_SIZE};
use crate::types::{NewStatusUpdate, StatusUpdate, UpdateId};

/// Hub tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    pub broadcast: BroadcastConfig,
    /// Rows per history read when a stream session drains or reconciles.
    pub history_page_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast: BroadcastConfig::default(),
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}

/// Shared handle over one update log and one broadcaster.
///
/// Built once at startup and passed to every handler; clones share state.
/// `push` holds an append lock across append + publish, so the order in which
/// subscribers receive a job's updates is the order of their ids.
#[derive(Clone)]
pub struct StatusHub {
    log: Arc<dyn UpdateLog>,
    broadcaster: Broadcaster,
    append_lock: Arc<Mutex<()>>,
    config: HubConfig,
}

impl StatusHub {
    pub fn new(log: Arc<dyn UpdateLog>, config: HubConfig) -> Self {
        Self {
            log,
            broadcaster: Broadcaster::new(config.broadcast),
            append_lock: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub fn config(&self) -> HubConfig {
        self.config
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn log(&self) -> &Arc<dyn UpdateLog> {
        &self.log
    }

    /// Persist `update` for `job_id`, then fan it out to live subscribers.
    ///
    /// Validation happens before the lock is taken; a rejected update is
    /// neither stored nor published.
    pub async fn push(&self, job_id: &str, update: NewStatusUpdate) -> StatusResult<StatusUpdate> {
        update.validate()?;

        let _guard = self.append_lock.lock().await;
        let record = self.log.append(job_id, &update).await?;
        let report = self.broadcaster.publish(job_id, &record);
        counter!("status_updates_appended_total").increment(1);

        info!(
            job_id,
            update_id = record.id,
            status = %record.status,
            delivered = report.delivered,
            dropped = report.dropped,
            "status update appended"
        );
        Ok(record)
    }

    /// One bounded page of `job_id` history after `after_id`.
    pub async fn history(
        &self,
        job_id: &str,
        after_id: Option<UpdateId>,
        limit: usize,
    ) -> StatusResult<Vec<StatusUpdate>> {
        self.log.read_after(job_id, after_id, limit).await
    }

    /// Start a stream session for `job_id` resuming after `after_id`.
    ///
    /// The session subscribes on its first poll and stops when `cancel` fires
    /// or when it is dropped.
    pub fn open_stream(
        &self,
        job_id: &str,
        after_id: Option<UpdateId>,
        cancel: CancellationToken,
    ) -> StreamSession {
        counter!("status_stream_sessions_opened_total").increment(1);
        StreamSession::new(
            job_id,
            after_id,
            Arc::clone(&self.log),
            self.broadcaster.clone(),
            self.config.history_page_size,
            cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusError;
    use crate::log::MemoryUpdateLog;
    use crate::session::SessionState;
    use std::time::Duration;

    async fn next_status(session: &mut StreamSession) -> String {
        tokio::time::timeout(Duration::from_secs(2), session.next_update())
            .await
            .expect("timed out")
            .expect("session closed")
            .expect("store error")
            .status
    }

    fn hub() -> (StatusHub, Arc<MemoryUpdateLog>) {
        let log = Arc::new(MemoryUpdateLog::new());
        (StatusHub::new(log.clone(), HubConfig::default()), log)
    }

    #[tokio::test]
    async fn test_push_then_history_scenario() {
        let (hub, _log) = hub();

        let first = hub
            .push("J1", NewStatusUpdate::new("running").with_progress(10))
            .await
            .unwrap();
        let second = hub
            .push("J1", NewStatusUpdate::new("done").with_progress(100))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let rows = hub.history("J1", None, 10).await.unwrap();
        let summary: Vec<_> = rows
            .iter()
            .map(|u| (u.id, u.status.as_str(), u.progress))
            .collect();
        assert_eq!(summary, vec![(1, "running", Some(10)), (2, "done", Some(100))]);
    }

    #[tokio::test]
    async fn test_push_rejects_invalid_progress_without_publishing() {
        let (hub, log) = hub();
        let mut sub = hub.broadcaster().subscribe("J1");

        let err = hub
            .push("J1", NewStatusUpdate::new("bad").with_progress(101))
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::Validation { .. }));
        assert!(log.is_empty());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_push_publishes_stored_record() {
        let (hub, _log) = hub();
        let mut sub = hub.broadcaster().subscribe("J1");

        let stored = hub
            .push("J1", NewStatusUpdate::new("running").with_stage("build"))
            .await
            .unwrap();
        let live = sub.recv().await.unwrap();
        assert_eq!(live, stored);
    }

    #[tokio::test]
    async fn test_concurrent_pushes_arrive_in_id_order() {
        let (hub, _log) = hub();
        let mut sub = hub.broadcaster().subscribe("J1");

        let mut tasks = Vec::new();
        for i in 0..20 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                hub.push("J1", NewStatusUpdate::new(format!("s{i}")))
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut ids = Vec::new();
        while let Some(update) = sub.try_recv() {
            ids.push(update.id);
        }
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_open_stream_bridges_history_and_live() {
        let (hub, _log) = hub();
        for status in ["queued", "running"] {
            hub.push("J1", NewStatusUpdate::new(status)).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let mut session = hub.open_stream("J1", None, cancel.clone());
        assert_eq!(next_status(&mut session).await, "queued");
        assert_eq!(next_status(&mut session).await, "running");

        hub.push("J1", NewStatusUpdate::new("done")).await.unwrap();
        assert_eq!(next_status(&mut session).await, "done");
        assert_eq!(session.state(), SessionState::Live);

        cancel.cancel();
        assert!(session.next_update().await.is_none());
        assert_eq!(hub.broadcaster().job_count(), 0);
    }
}
