//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped snapshots leave no
//! trace.

use std::future::Future;

use easel_core::{ShapeFilter, ShapeKind};

use super::{make_shape, make_thread, seed_shape, TestResult};
use crate::{NewLogEntry, SceneStorage, StorageError, ThreadStatus};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "begin_commit_abort_succeed",
            begin_commit_abort_succeed(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "uncommitted_insert_invisible",
            uncommitted_insert_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "snapshot_sees_own_writes",
            snapshot_sees_own_writes(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "abort_discards_all_writes",
            abort_discards_all_writes(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "dropped_snapshot_rolls_back",
            dropped_snapshot_rolls_back(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "commit_is_all_or_nothing_across_tables",
            commit_is_all_or_nothing_across_tables(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "sequential_snapshots_see_prior_commits",
            sequential_snapshots_see_prior_commits(factory).await,
        ),
    ]
}

async fn begin_commit_abort_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_shape(&mut snap, make_shape("pending", ShapeKind::Circle, 1))
        .await
        .map_err(|e| e.to_string())?;

    let visible = s.get_shape("pending").await;
    let listed = s
        .list_shapes(&ShapeFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    let counts = s.count_by_kind().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if !matches!(visible, Err(StorageError::ShapeNotFound { .. })) {
        return Err(format!("uncommitted shape visible to get: {visible:?}"));
    }
    if !listed.is_empty() || !counts.is_empty() {
        return Err("uncommitted shape visible to list/count".into());
    }
    s.get_shape("pending")
        .await
        .map_err(|e| format!("committed shape not visible: {e}"))?;
    Ok(())
}

async fn snapshot_sees_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_shape(&mut snap, make_shape("mine", ShapeKind::Square, 1))
        .await
        .map_err(|e| e.to_string())?;
    let read = s.get_shape_for_update(&mut snap, "mine").await;
    s.put_thread(&mut snap, make_thread("th", ThreadStatus::Idle))
        .await
        .map_err(|e| e.to_string())?;
    let thread = s.get_thread_for_update(&mut snap, "th").await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    read.map_err(|e| format!("own shape write invisible: {e}"))?;
    thread.map_err(|e| format!("own thread write invisible: {e}"))?;
    Ok(())
}

async fn abort_discards_all_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_shape(&s, "keep", ShapeKind::Triangle).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let removed = s
        .remove_shape(&mut snap, "keep")
        .await
        .map_err(|e| e.to_string())?;
    s.append_log_entry(&mut snap, NewLogEntry::delete("s1", removed, None, "t"))
        .await
        .map_err(|e| e.to_string())?;
    s.put_thread(&mut snap, make_thread("th", ThreadStatus::Suspended))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    s.get_shape("keep")
        .await
        .map_err(|e| format!("aborted remove took effect: {e}"))?;
    let log = s.list_log_entries("s1", 0).await.map_err(|e| e.to_string())?;
    if !log.is_empty() {
        return Err("aborted log entry persisted".into());
    }
    match s.get_thread("th").await {
        Err(StorageError::ThreadNotFound { .. }) => Ok(()),
        other => Err(format!("aborted thread record persisted: {other:?}")),
    }
}

async fn dropped_snapshot_rolls_back<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_shape(&mut snap, make_shape("dropped", ShapeKind::Circle, 1))
            .await
            .map_err(|e| e.to_string())?;
    }
    // The writer lock must also have been released by the drop.
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match s.get_shape("dropped").await {
        Err(StorageError::ShapeNotFound { .. }) => Ok(()),
        other => Err(format!("dropped snapshot persisted a write: {other:?}")),
    }
}

async fn commit_is_all_or_nothing_across_tables<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let seq = s
        .next_shape_sequence(&mut snap)
        .await
        .map_err(|e| e.to_string())?;
    let shape = make_shape("new", ShapeKind::Circle, seq);
    s.insert_shape(&mut snap, shape.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.append_log_entry(&mut snap, NewLogEntry::create("s1", shape, None, "t"))
        .await
        .map_err(|e| e.to_string())?;
    s.put_thread(&mut snap, make_thread("th", ThreadStatus::Idle))
        .await
        .map_err(|e| e.to_string())?;
    // A failing write inside the same snapshot must not poison the rest.
    let dup = s
        .insert_shape(&mut snap, make_shape("new", ShapeKind::Circle, seq))
        .await;
    if !matches!(dup, Err(StorageError::AlreadyExists { .. })) {
        return Err(format!("expected AlreadyExists, got {dup:?}"));
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    s.get_shape("new").await.map_err(|e| e.to_string())?;
    let log = s.list_log_entries("s1", 0).await.map_err(|e| e.to_string())?;
    if log.len() != 1 {
        return Err(format!("expected 1 log entry, got {}", log.len()));
    }
    s.get_thread("th").await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_shape(&s, "first", ShapeKind::Circle).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let read = s.get_shape_for_update(&mut snap, "first").await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    read.map_err(|e| format!("later snapshot missed committed shape: {e}"))?;
    Ok(())
}
