// crates/core/src/session.rs
//! Per-connection stream of status updates: durable history first, then live.
//!
//! Handover policy: the session subscribes to the broadcaster *before* it
//! reads history, and drops any update whose id is not greater than the last
//! one it emitted. An update published while the history is being drained is
//! therefore seen once (from the page, the live channel, or both), never zero
//! times.
//!
//! If the live channel overflowed (see `Subscription::dropped`), the session
//! re-reads the log after its last emitted id before continuing, so a slow
//! consumer loses latency, not events.
//!
//! ```text
//! INIT ──▶ DRAINING_HISTORY ──▶ LIVE ──▶ CLOSED
//!                 │                         ▲
//!                 └─────────────────────────┘  (cancel / store error)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::broadcaster::{Broadcaster, Subscription};
use crate::error::{StatusError, StatusResult};
use crate::log::UpdateLog;
use crate::types::{StatusUpdate, UpdateId};

/// Default number of history rows fetched per log read.
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    DrainingHistory,
    Live,
    Closed,
}

/// Pick the resume cursor for a new session.
///
/// A present query parameter decides on its own: when it is not an integer
/// the session replays from the start and `Last-Event-ID` is not consulted.
pub fn resolve_cursor(query_after_id: Option<&str>, last_event_id: Option<&str>) -> Option<UpdateId> {
    let (source, raw) = match query_after_id {
        Some(raw) => ("after_id", raw),
        None => ("last_event_id", last_event_id?),
    };
    let raw = raw.trim();
    match raw.parse::<UpdateId>() {
        Ok(id) => Some(id),
        Err(_) => {
            debug!(source, value = raw, "ignoring malformed resume cursor");
            None
        }
    }
}

/// One subscriber's gapless, ordered view of a job's updates.
pub struct StreamSession {
    job_id: String,
    log: Arc<dyn UpdateLog>,
    broadcaster: Broadcaster,
    cancel: CancellationToken,
    page_size: usize,
    state: SessionState,
    subscription: Option<Subscription>,
    backlog: VecDeque<StatusUpdate>,
    history_exhausted: bool,
    last_id: Option<UpdateId>,
    dropped_seen: u64,
}

impl StreamSession {
    pub fn new(
        job_id: impl Into<String>,
        after_id: Option<UpdateId>,
        log: Arc<dyn UpdateLog>,
        broadcaster: Broadcaster,
        page_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            log,
            broadcaster,
            cancel,
            page_size: page_size.max(1),
            state: SessionState::Init,
            subscription: None,
            backlog: VecDeque::new(),
            history_exhausted: false,
            last_id: after_id,
            dropped_seen: 0,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the last update emitted (or the resume cursor before any).
    pub fn last_id(&self) -> Option<UpdateId> {
        self.last_id
    }

    /// Next update for this subscriber.
    ///
    /// Returns `None` once the session is closed (cancelled or after an
    /// error). A store error is yielded once, then the session is closed.
    pub async fn next_update(&mut self) -> Option<StatusResult<StatusUpdate>> {
        loop {
            if self.state == SessionState::Closed {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.close();
                return None;
            }

            match self.state {
                SessionState::Init => {
                    self.subscription = Some(self.broadcaster.subscribe(&self.job_id));
                    self.transition(SessionState::DrainingHistory);
                }
                SessionState::DrainingHistory => {
                    if let Some(update) = self.pop_backlog() {
                        return Some(Ok(update));
                    }
                    if self.history_exhausted {
                        self.transition(SessionState::Live);
                        continue;
                    }
                    match self.read_page(self.last_id).await {
                        None => {
                            self.close();
                            return None;
                        }
                        Some(Err(e)) => return Some(Err(self.fail(e))),
                        Some(Ok(page)) => {
                            self.history_exhausted = page.len() < self.page_size;
                            trace!(job_id = %self.job_id, rows = page.len(), "history page");
                            self.backlog.extend(page);
                        }
                    }
                }
                SessionState::Live => {
                    if let Some(update) = self.pop_backlog() {
                        return Some(Ok(update));
                    }
                    let Some(subscription) = self.subscription.as_mut() else {
                        self.close();
                        return None;
                    };
                    let received = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        update = subscription.recv() => update,
                    };
                    let dropped = subscription.dropped();

                    let Some(update) = received else {
                        self.close();
                        return None;
                    };

                    if dropped > self.dropped_seen {
                        warn!(
                            job_id = %self.job_id,
                            missed = dropped - self.dropped_seen,
                            "live channel overflowed, reconciling from update log"
                        );
                        self.dropped_seen = dropped;
                        match self.catch_up(update).await {
                            None => {
                                self.close();
                                return None;
                            }
                            Some(Err(e)) => return Some(Err(self.fail(e))),
                            Some(Ok(())) => continue,
                        }
                    }

                    if self.accept(&update) {
                        return Some(Ok(update));
                    }
                }
                SessionState::Closed => return None,
            }
        }
    }

    /// Enter CLOSED and release the subscription. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.release();
        }
        self.backlog.clear();
        self.transition(SessionState::Closed);
    }

    /// Adapt the session into a `Stream`, e.g. for an SSE response body.
    ///
    /// Dropping the stream drops the session, which releases the subscription.
    pub fn into_stream(mut self) -> impl Stream<Item = StatusResult<StatusUpdate>> + Send {
        async_stream::stream! {
            while let Some(item) = self.next_update().await {
                yield item;
            }
        }
    }

    /// One cancellable log read. `None` means the session was cancelled.
    async fn read_page(
        &self,
        after_id: Option<UpdateId>,
    ) -> Option<StatusResult<Vec<StatusUpdate>>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            page = self.log.read_after(&self.job_id, after_id, self.page_size) => Some(page),
        }
    }

    /// Refill the backlog with everything after the last emitted id, then
    /// queue `trigger` if the log read did not already cover it.
    async fn catch_up(&mut self, trigger: StatusUpdate) -> Option<StatusResult<()>> {
        let mut after = self.last_id;
        loop {
            let page = match self.read_page(after).await? {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };
            let exhausted = page.len() < self.page_size;
            if let Some(last) = page.last() {
                after = Some(last.id);
            }
            self.backlog.extend(page);
            if exhausted {
                break;
            }
        }
        if after.map_or(true, |after| trigger.id > after) {
            self.backlog.push_back(trigger);
        }
        Some(Ok(()))
    }

    fn pop_backlog(&mut self) -> Option<StatusUpdate> {
        while let Some(update) = self.backlog.pop_front() {
            if self.accept(&update) {
                return Some(update);
            }
        }
        None
    }

    /// Advance the cursor if `update` is new; duplicates are skipped.
    fn accept(&mut self, update: &StatusUpdate) -> bool {
        if self.last_id.is_some_and(|last| update.id <= last) {
            trace!(job_id = %self.job_id, update_id = update.id, "skipping already-emitted update");
            return false;
        }
        self.last_id = Some(update.id);
        true
    }

    fn fail(&mut self, error: StatusError) -> StatusError {
        warn!(job_id = %self.job_id, error = %error, "stream session aborted by store error");
        self.close();
        error
    }

    fn transition(&mut self, next: SessionState) {
        debug!(job_id = %self.job_id, from = ?self.state, to = ?next, "stream session state");
        self.state = next;
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}
