use std::future::Future;

use super::{make_thread, TestResult};
use crate::{SceneStorage, StorageError, ThreadMessage, ThreadStatus};

pub(super) async fn run_thread_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "threads",
            "put_then_get_round_trips",
            put_then_get_round_trips(factory).await,
        ),
        TestResult::from_result(
            "threads",
            "put_overwrites_existing",
            put_overwrites_existing(factory).await,
        ),
        TestResult::from_result(
            "threads",
            "missing_thread_not_found",
            missing_thread_not_found(factory).await,
        ),
    ]
}

async fn put_then_get_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_thread("th-1", ThreadStatus::Suspended);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.put_thread(&mut snap, record.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let read = s.get_thread("th-1").await.map_err(|e| e.to_string())?;
    if read != record {
        return Err(format!("expected {record:?}, got {read:?}"));
    }
    Ok(())
}

async fn put_overwrites_existing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_thread("th-1", ThreadStatus::Suspended);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.put_thread(&mut snap, record.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    record.status = ThreadStatus::Idle;
    record.resume_token = None;
    record.context = serde_json::json!({});
    record.history.push(ThreadMessage {
        role: "assistant".to_string(),
        content: "Deleted 1 circle.".to_string(),
    });
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let current = s
        .get_thread_for_update(&mut snap, "th-1")
        .await
        .map_err(|e| e.to_string())?;
    if current.status != ThreadStatus::Suspended {
        return Err("snapshot read returned stale thread".into());
    }
    s.put_thread(&mut snap, record.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let read = s.get_thread("th-1").await.map_err(|e| e.to_string())?;
    if read != record {
        return Err(format!("expected {record:?}, got {read:?}"));
    }
    Ok(())
}

async fn missing_thread_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_thread("nope").await {
        Err(StorageError::ThreadNotFound { thread_id }) if thread_id == "nope" => {}
        other => return Err(format!("expected ThreadNotFound, got {other:?}")),
    }
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_thread_for_update(&mut snap, "nope").await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => Err(format!("expected ThreadNotFound, got {other:?}")),
    }
}
