use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use easel_core::{ShapeFilter, ShapeKind};

use super::{make_shape, TestResult};
use crate::{NewLogEntry, SceneStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_inserts_get_unique_sequences",
            concurrent_inserts_get_unique_sequences(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_same_id_exactly_one_wins",
            concurrent_same_id_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_appends_get_unique_ids",
            concurrent_appends_get_unique_ids(factory).await,
        ),
    ]
}

// ── Concurrent inserts: every writer lands, sequences unique ────────────────

/// N tasks each open a snapshot, draw a sequence, insert a distinct shape and
/// commit. The writer lock serializes them: all succeed, no sequence repeats.
async fn concurrent_inserts_get_unique_sequences<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let seq = s.next_shape_sequence(&mut snap).await?;
            s.insert_shape(&mut snap, make_shape(&format!("shape-{i}"), ShapeKind::Circle, seq))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<u64, StorageError>(seq)
        }));
    }

    let mut sequences = HashSet::new();
    for handle in handles {
        let seq = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if !sequences.insert(seq) {
            return Err(format!("sequence {seq} issued twice"));
        }
    }

    let stored = storage
        .list_shapes(&ShapeFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    if stored.len() != N {
        return Err(format!("expected {N} shapes, found {}", stored.len()));
    }
    Ok(())
}

// ── Concurrent insert of one id: exactly one wins ───────────────────────────

async fn concurrent_same_id_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s
                .insert_shape(&mut snap, make_shape("contested", ShapeKind::Square, 1))
                .await
            {
                Ok(()) => {
                    s.commit_snapshot(snap).await?;
                    Ok(true)
                }
                Err(StorageError::AlreadyExists { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent log appends: ids unique and all visible ──────────────────────

async fn concurrent_appends_get_unique_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let entry = NewLogEntry::create(
                "shared-session",
                make_shape(&format!("shape-{i}"), ShapeKind::Triangle, i as u64 + 1),
                None,
                "2025-01-01T00:00:00Z",
            );
            let stored = s.append_log_entry(&mut snap, entry).await?;
            s.commit_snapshot(snap).await?;
            Ok::<i64, StorageError>(stored.id)
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if !ids.insert(id) {
            return Err(format!("log id {id} issued twice"));
        }
    }
    let listed = storage
        .list_log_entries("shared-session", 0)
        .await
        .map_err(|e| e.to_string())?;
    if listed.len() != N {
        return Err(format!("expected {N} entries, found {}", listed.len()));
    }
    Ok(())
}
