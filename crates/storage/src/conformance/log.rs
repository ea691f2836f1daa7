//! Operation log conformance tests.
//!
//! Entries are append-only: the backend assigns monotonic ids, validates the
//! before/after invariant, and only ever flips `undone` afterwards.

use std::future::Future;

use easel_core::ShapeKind;

use super::{make_shape, TestResult};
use crate::{NewLogEntry, OperationKind, SceneStorage, StorageError};

pub(super) async fn run_log_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "log",
            "append_assigns_monotonic_ids",
            append_assigns_monotonic_ids(factory).await,
        ),
        TestResult::from_result(
            "log",
            "malformed_entries_rejected",
            malformed_entries_rejected(factory).await,
        ),
        TestResult::from_result(
            "log",
            "entries_round_trip_snapshots",
            entries_round_trip_snapshots(factory).await,
        ),
        TestResult::from_result(
            "log",
            "set_undone_flips_flag_only",
            set_undone_flips_flag_only(factory).await,
        ),
        TestResult::from_result(
            "log",
            "set_undone_missing_entry",
            set_undone_missing_entry(factory).await,
        ),
        TestResult::from_result(
            "log",
            "undo_and_redo_candidates",
            undo_and_redo_candidates(factory).await,
        ),
        TestResult::from_result(
            "log",
            "batch_entries_scoped_to_session",
            batch_entries_scoped_to_session(factory).await,
        ),
        TestResult::from_result(
            "log",
            "list_entries_newest_first_with_limit",
            list_entries_newest_first_with_limit(factory).await,
        ),
    ]
}

const AT: &str = "2025-01-01T00:00:00Z";

fn create_entry(session: &str, id: &str, batch: Option<&str>) -> NewLogEntry {
    NewLogEntry::create(
        session,
        make_shape(id, ShapeKind::Circle, 1),
        batch.map(str::to_string),
        AT,
    )
}

/// Append `entries` in one committed snapshot and return their ids.
async fn append_all<S: SceneStorage>(s: &S, entries: Vec<NewLogEntry>) -> Result<Vec<i64>, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut ids = Vec::new();
    for entry in entries {
        let stored = s
            .append_log_entry(&mut snap, entry)
            .await
            .map_err(|e| e.to_string())?;
        ids.push(stored.id);
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(ids)
}

async fn append_assigns_monotonic_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = append_all(&s, vec![create_entry("s1", "a", None), create_entry("s1", "b", None)]).await?;
    let second = append_all(&s, vec![create_entry("s2", "c", None)]).await?;
    let all: Vec<i64> = first.iter().chain(second.iter()).copied().collect();
    if !all.windows(2).all(|w| w[0] < w[1]) {
        return Err(format!("ids not strictly increasing: {all:?}"));
    }
    Ok(())
}

async fn malformed_entries_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let shape = make_shape("x", ShapeKind::Square, 1);
    let mut bad_create = NewLogEntry::create("s1", shape.clone(), None, AT);
    bad_create.before_state = Some(shape.clone());
    let mut bad_delete = NewLogEntry::delete("s1", shape.clone(), None, AT);
    bad_delete.after_state = Some(shape.clone());
    let mut bad_update = NewLogEntry::update("s1", shape.clone(), shape.clone(), None, AT);
    bad_update.after_state = None;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (label, entry) in [
        ("create", bad_create),
        ("delete", bad_delete),
        ("update", bad_update),
    ] {
        match s.append_log_entry(&mut snap, entry).await {
            Err(StorageError::MalformedEntry(_)) => {}
            other => {
                return Err(format!("{label}: expected MalformedEntry, got {other:?}"));
            }
        }
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn entries_round_trip_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let before = make_shape("t", ShapeKind::Triangle, 3);
    let mut after = before.clone();
    after.color = easel_core::Color::parse("blue").map_err(|e| e.to_string())?;
    append_all(
        &s,
        vec![NewLogEntry::update("s1", before.clone(), after.clone(), Some("b1".into()), AT)],
    )
    .await?;

    let entries = s.list_log_entries("s1", 0).await.map_err(|e| e.to_string())?;
    let [entry] = entries.as_slice() else {
        return Err(format!("expected one entry, got {}", entries.len()));
    };
    if entry.kind != OperationKind::Update
        || entry.before_state.as_ref() != Some(&before)
        || entry.after_state.as_ref() != Some(&after)
        || entry.batch_id.as_deref() != Some("b1")
        || entry.shape_id.as_deref() != Some("t")
        || entry.undone
    {
        return Err(format!("entry did not round-trip: {entry:?}"));
    }
    Ok(())
}

async fn set_undone_flips_flag_only<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = append_all(&s, vec![create_entry("s1", "a", None)]).await?;
    let original = s.list_log_entries("s1", 0).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.set_undone(&mut snap, ids[0], true)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let flipped = s.list_log_entries("s1", 0).await.map_err(|e| e.to_string())?;
    let mut expected = original.clone();
    expected[0].undone = true;
    if flipped != expected {
        return Err(format!("expected {expected:?}, got {flipped:?}"));
    }
    Ok(())
}

async fn set_undone_missing_entry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.set_undone(&mut snap, 4242, true).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::EntryNotFound { id: 4242 }) => Ok(()),
        other => Err(format!("expected EntryNotFound, got {other:?}")),
    }
}

async fn undo_and_redo_candidates<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = append_all(
        &s,
        vec![
            create_entry("s1", "a", None),
            create_entry("s1", "b", None),
            create_entry("s1", "c", None),
            create_entry("other", "z", None),
        ],
    )
    .await?;
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let last = s
        .last_active_entry(&mut snap, "s1")
        .await
        .map_err(|e| e.to_string())?;
    if last.as_ref().map(|e| e.id) != Some(c) {
        return Err(format!("expected last active {c}, got {last:?}"));
    }
    let none = s
        .last_undone_entry(&mut snap, "s1")
        .await
        .map_err(|e| e.to_string())?;
    if none.is_some() {
        return Err(format!("nothing undone yet, got {none:?}"));
    }

    // Undo b then c: the newest undone entry is c whatever the order.
    for id in [b, c] {
        s.set_undone(&mut snap, id, true).await.map_err(|e| e.to_string())?;
    }
    s.set_undone(&mut snap, ids[3], true).await.map_err(|e| e.to_string())?;
    let last = s
        .last_active_entry(&mut snap, "s1")
        .await
        .map_err(|e| e.to_string())?;
    if last.as_ref().map(|e| e.id) != Some(a) {
        return Err(format!("expected last active {a}, got {last:?}"));
    }
    let undone = s
        .last_undone_entry(&mut snap, "s1")
        .await
        .map_err(|e| e.to_string())?;
    match undone {
        Some(entry) if entry.id == c && entry.shape_id.as_deref() == Some("c") => {}
        other => return Err(format!("expected undone candidate {c}, got {other:?}")),
    }

    // Redoing c leaves b as the next candidate.
    s.set_undone(&mut snap, c, false).await.map_err(|e| e.to_string())?;
    let next = s
        .last_undone_entry(&mut snap, "s1")
        .await
        .map_err(|e| e.to_string())?;
    if next.as_ref().map(|e| e.id) != Some(b) {
        return Err(format!("expected undone candidate {b}, got {next:?}"));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn batch_entries_scoped_to_session<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = append_all(
        &s,
        vec![
            create_entry("s1", "a", Some("batch-1")),
            create_entry("s1", "b", Some("batch-1")),
            create_entry("s1", "c", None),
            create_entry("s2", "d", Some("batch-1")),
        ],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let batch = s
        .batch_entries(&mut snap, "s1", "batch-1")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    let got: Vec<i64> = batch.iter().map(|e| e.id).collect();
    if got != [ids[0], ids[1]] {
        return Err(format!("expected {:?}, got {got:?}", &ids[..2]));
    }
    Ok(())
}

async fn list_entries_newest_first_with_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entries = (0..5).map(|i| create_entry("s1", &format!("shape-{i}"), None)).collect();
    let ids = append_all(&s, entries).await?;
    let listed: Vec<i64> = s
        .list_log_entries("s1", 3)
        .await
        .map_err(|e| e.to_string())?
        .iter()
        .map(|e| e.id)
        .collect();
    let expected: Vec<i64> = ids.iter().rev().take(3).copied().collect();
    if listed != expected {
        return Err(format!("expected {expected:?}, got {listed:?}"));
    }
    let other = s.list_log_entries("nobody", 10).await.map_err(|e| e.to_string())?;
    if !other.is_empty() {
        return Err("unknown session should have no entries".into());
    }
    Ok(())
}
