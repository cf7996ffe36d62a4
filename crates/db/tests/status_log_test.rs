//! Integration tests for the SQLite update log driving a `StatusHub`.

use std::sync::Arc;
use std::time::Duration;

use agent_status_core::{
    HubConfig, NewStatusUpdate, SessionState, StatusHub, StatusUpdate, StreamSession, UpdateLog,
};
use agent_status_db::Database;
use tokio_util::sync::CancellationToken;

async fn next_id(session: &mut StreamSession) -> i64 {
    tokio::time::timeout(Duration::from_secs(2), session.next_update())
        .await
        .expect("session should yield within the timeout")
        .expect("session should still be open")
        .expect("store read should succeed")
        .id
}

#[tokio::test]
async fn test_updates_survive_reopen_and_ids_continue() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("status.db");

    let first: Vec<StatusUpdate> = {
        let db = Database::new(&path).await.unwrap();
        db.create_job("J1", "build", &Default::default()).await.unwrap();
        let mut out = Vec::new();
        for status in ["queued", "running"] {
            out.push(db.append("J1", &NewStatusUpdate::new(status)).await.unwrap());
        }
        db.pool().close().await;
        out
    };

    let db = Database::new(&path).await.unwrap();
    assert!(db.job_exists("J1").await.unwrap());
    assert_eq!(db.read_after("J1", None, 10).await.unwrap(), first);

    let next = db.append("J1", &NewStatusUpdate::new("done")).await.unwrap();
    assert_eq!(next.id, 3, "ids must keep increasing after reopen");
}

#[tokio::test]
async fn test_stream_resumes_from_cursor_over_sqlite() {
    let db = Database::new_in_memory().await.unwrap();
    let hub = StatusHub::new(Arc::new(db), HubConfig::default());

    for i in 1..=5 {
        hub.push("J1", NewStatusUpdate::new(format!("step-{i}")))
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let mut session = hub.open_stream("J1", Some(2), cancel.clone());
    assert_eq!(next_id(&mut session).await, 3);
    assert_eq!(next_id(&mut session).await, 4);
    assert_eq!(next_id(&mut session).await, 5);

    let idle = tokio::time::timeout(Duration::from_millis(100), session.next_update()).await;
    assert!(idle.is_err(), "no further events until a new push");
    assert_eq!(session.state(), SessionState::Live);

    let pushed = hub.push("J1", NewStatusUpdate::new("done")).await.unwrap();
    assert_eq!(next_id(&mut session).await, pushed.id);

    cancel.cancel();
    assert!(session.next_update().await.is_none());
    assert_eq!(hub.broadcaster().subscriber_count("J1"), 0);
}

#[tokio::test]
async fn test_concurrent_pushes_are_observed_in_id_order() {
    let db = Database::new_in_memory().await.unwrap();
    let hub = StatusHub::new(Arc::new(db), HubConfig::default());
    let cancel = CancellationToken::new();
    let mut session = hub.open_stream("J1", None, cancel.clone());

    // Subscribe before the producers start.
    let first = hub.push("J1", NewStatusUpdate::new("start")).await.unwrap();
    assert_eq!(next_id(&mut session).await, first.id);

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..5 {
                hub.push("J1", NewStatusUpdate::new(format!("w{worker}-{i}")))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        seen.push(next_id(&mut session).await);
    }
    let mut sorted = seen.clone();
    sorted.sort_unstable();
    assert_eq!(seen, sorted, "live delivery must follow id order");
    sorted.dedup();
    assert_eq!(sorted.len(), 20);

    cancel.cancel();
}
