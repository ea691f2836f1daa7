//! Operation journal: applies mutation plans with their log entries, and
//! replays the log backwards (undo) and forwards (redo).
//!
//! Every function here runs against an open snapshot or opens its own, so
//! a shape change and the entry recording it are committed together or not
//! at all. Replay is conflict-safe: a step that would clash with the
//! current scene is skipped and reported, and the entry's `undone` flag is
//! flipped regardless so the log stays consistent.

use easel_core::Shape;
use easel_storage::{
    NewLogEntry, OperationKind, OperationLogEntry, SceneStorage, ShapeDelta, StorageError,
};
use serde::{Deserialize, Serialize};

use crate::executor::{count_noun, Mutation, MutationPlan};

/// What a committed plan actually did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Post-mutation state of each created or modified shape; pre-deletion
    /// state of each deleted one.
    pub applied: Vec<Shape>,
    /// Targets that disappeared between resolution and commit.
    pub not_found: Vec<String>,
    /// Targets whose new geometry was invalid, with the reason.
    pub rejected: Vec<(String, String)>,
    pub batch_id: Option<String>,
}

/// Apply `plan` inside `snapshot`, appending one log entry per applied
/// mutation. A batch (more than one mutation) shares a fresh batch id.
///
/// Per-target "not found" and geometry rejections are collected in the
/// report; any other storage error aborts the whole plan.
pub async fn apply_plan<S: SceneStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    session_id: &str,
    plan: &MutationPlan,
    at: &str,
) -> Result<CommitReport, StorageError> {
    let batch_id = plan
        .is_batch()
        .then(|| uuid::Uuid::new_v4().to_string());
    let mut report = CommitReport {
        batch_id: batch_id.clone(),
        ..CommitReport::default()
    };

    for mutation in &plan.mutations {
        match mutation {
            Mutation::Insert(new) => {
                let sequence = storage.next_shape_sequence(snapshot).await?;
                let shape = Shape {
                    id: uuid::Uuid::new_v4().to_string(),
                    kind: new.kind,
                    geometry: new.geometry.clone(),
                    color: new.color.clone(),
                    sequence,
                    created_at: at.to_string(),
                    updated_at: at.to_string(),
                };
                storage.insert_shape(snapshot, shape.clone()).await?;
                storage
                    .append_log_entry(
                        snapshot,
                        NewLogEntry::create(session_id, shape.clone(), batch_id.clone(), at),
                    )
                    .await?;
                report.applied.push(shape);
            }
            Mutation::Delete { id } => match storage.remove_shape(snapshot, id).await {
                Ok(before) => {
                    storage
                        .append_log_entry(
                            snapshot,
                            NewLogEntry::delete(session_id, before.clone(), batch_id.clone(), at),
                        )
                        .await?;
                    report.applied.push(before);
                }
                Err(StorageError::ShapeNotFound { .. }) => report.not_found.push(id.clone()),
                Err(e) => return Err(e),
            },
            Mutation::Update { id, changes } => {
                let before = match storage.get_shape_for_update(snapshot, id).await {
                    Ok(shape) => shape,
                    Err(StorageError::ShapeNotFound { .. }) => {
                        report.not_found.push(id.clone());
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let target = match changes.apply(&before, at) {
                    Ok(shape) => shape,
                    Err(e) => {
                        report.rejected.push((before.short_id().to_string(), e.to_string()));
                        continue;
                    }
                };
                let delta = ShapeDelta {
                    geometry: Some(target.geometry),
                    color: Some(target.color),
                    updated_at: at.to_string(),
                };
                let after = storage.update_shape(snapshot, id, delta).await?;
                storage
                    .append_log_entry(
                        snapshot,
                        NewLogEntry::update(
                            session_id,
                            before,
                            after.clone(),
                            batch_id.clone(),
                            at,
                        ),
                    )
                    .await?;
                report.applied.push(after);
            }
        }
    }

    tracing::info!(
        session_id,
        intent = %plan.intent,
        applied = report.applied.len(),
        not_found = report.not_found.len(),
        rejected = report.rejected.len(),
        batch_id = batch_id.as_deref().unwrap_or(""),
        "plan applied"
    );
    Ok(report)
}

/// Result of an undo or redo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub success: bool,
    pub message: String,
    /// Ids of shapes the replay changed.
    pub affected_shapes: Vec<String>,
    /// Ids whose step was skipped because it conflicted with the scene.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl ReplayOutcome {
    fn nothing(message: &str) -> Self {
        ReplayOutcome {
            success: false,
            message: message.to_string(),
            affected_shapes: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Revert the session's most recent active entry, with its batch.
pub async fn undo<S: SceneStorage>(storage: &S, session_id: &str) -> Result<ReplayOutcome, StorageError> {
    let mut snapshot = storage.begin_snapshot().await?;
    match undo_in(storage, &mut snapshot, session_id).await {
        Ok(outcome) => {
            storage.commit_snapshot(snapshot).await?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(abort) = storage.abort_snapshot(snapshot).await {
                tracing::warn!(error = %abort, session_id, "undo: abort failed");
            }
            Err(e)
        }
    }
}

/// Re-apply the session's most recent undone entry, with its batch.
pub async fn redo<S: SceneStorage>(storage: &S, session_id: &str) -> Result<ReplayOutcome, StorageError> {
    let mut snapshot = storage.begin_snapshot().await?;
    match redo_in(storage, &mut snapshot, session_id).await {
        Ok(outcome) => {
            storage.commit_snapshot(snapshot).await?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(abort) = storage.abort_snapshot(snapshot).await {
                tracing::warn!(error = %abort, session_id, "redo: abort failed");
            }
            Err(e)
        }
    }
}

async fn undo_in<S: SceneStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    session_id: &str,
) -> Result<ReplayOutcome, StorageError> {
    let Some(last) = storage.last_active_entry(snapshot, session_id).await? else {
        return Ok(ReplayOutcome::nothing("Nothing to undo."));
    };
    let mut group = group_of(storage, snapshot, session_id, &last, false).await?;
    // Newest first, so a batch unwinds in reverse.
    group.reverse();

    let outcome = replay(storage, snapshot, &group, Direction::Undo).await?;
    tracing::info!(session_id, entry_id = last.id, entries = group.len(), "undo");
    Ok(outcome)
}

async fn redo_in<S: SceneStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    session_id: &str,
) -> Result<ReplayOutcome, StorageError> {
    let Some(last) = storage.last_undone_entry(snapshot, session_id).await? else {
        return Ok(ReplayOutcome::nothing("Nothing to redo."));
    };
    // Oldest first, so a batch is re-applied in its original order.
    let group = group_of(storage, snapshot, session_id, &last, true).await?;

    let outcome = replay(storage, snapshot, &group, Direction::Redo).await?;
    tracing::info!(session_id, entry_id = last.id, entries = group.len(), "redo");
    Ok(outcome)
}

/// `entry` plus its batch siblings whose `undone` flag equals `undone`,
/// oldest first.
async fn group_of<S: SceneStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    session_id: &str,
    entry: &OperationLogEntry,
    undone: bool,
) -> Result<Vec<OperationLogEntry>, StorageError> {
    let entries = match &entry.batch_id {
        Some(batch) => storage.batch_entries(snapshot, session_id, batch).await?,
        None => vec![entry.clone()],
    };
    Ok(entries.into_iter().filter(|e| e.undone == undone).collect())
}

async fn replay<S: SceneStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    group: &[OperationLogEntry],
    direction: Direction,
) -> Result<ReplayOutcome, StorageError> {
    let mut affected = Vec::new();
    let mut skipped = Vec::new();
    for entry in group {
        let shape_id = entry.shape_id.clone().unwrap_or_default();
        if step(storage, snapshot, entry, direction).await? {
            affected.push(shape_id);
        } else {
            tracing::warn!(
                entry_id = entry.id,
                shape_id = %shape_id,
                kind = %entry.kind,
                "replay step conflicts with current scene; skipped"
            );
            skipped.push(shape_id);
        }
        storage
            .set_undone(snapshot, entry.id, direction == Direction::Undo)
            .await?;
    }

    let verb = match direction {
        Direction::Undo => "Undid",
        Direction::Redo => "Redid",
    };
    let kind = group.first().map(|e| e.kind.as_str()).unwrap_or("change");
    let mut message = format!("{} {} of {}.", verb, kind, count_noun(group.len(), "shape"));
    if !skipped.is_empty() {
        message.push_str(&format!(
            " Skipped {} that conflicted with the current scene.",
            skipped.len()
        ));
    }
    Ok(ReplayOutcome {
        success: true,
        message,
        affected_shapes: affected,
        skipped,
    })
}

/// Apply one inverse (undo) or forward (redo) step. Returns false when the
/// step was skipped as a conflict.
async fn step<S: SceneStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    entry: &OperationLogEntry,
    direction: Direction,
) -> Result<bool, StorageError> {
    use Direction::*;
    use OperationKind::*;

    let result = match (entry.kind, direction) {
        (Create, Undo) | (Delete, Redo) => {
            let id = entry
                .shape_id
                .as_deref()
                .ok_or_else(|| malformed(entry, "shape_id"))?;
            storage.remove_shape(snapshot, id).await.map(|_| ())
        }
        (Delete, Undo) => {
            let before = entry
                .before_state
                .clone()
                .ok_or_else(|| malformed(entry, "before_state"))?;
            storage.insert_shape(snapshot, before).await
        }
        (Create, Redo) => {
            let after = entry
                .after_state
                .clone()
                .ok_or_else(|| malformed(entry, "after_state"))?;
            storage.insert_shape(snapshot, after).await
        }
        (Update, Undo) => {
            let before = entry
                .before_state
                .clone()
                .ok_or_else(|| malformed(entry, "before_state"))?;
            storage.replace_shape(snapshot, before).await
        }
        (Update, Redo) => {
            let after = entry
                .after_state
                .clone()
                .ok_or_else(|| malformed(entry, "after_state"))?;
            storage.replace_shape(snapshot, after).await
        }
    };
    match result {
        Ok(()) => Ok(true),
        Err(StorageError::ShapeNotFound { .. }) | Err(StorageError::AlreadyExists { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn malformed(entry: &OperationLogEntry, field: &str) -> StorageError {
    StorageError::MalformedEntry(format!("{} entry {} has no {}", entry.kind, entry.id, field))
}

/// The session's most recent entries, newest first.
pub async fn history<S: SceneStorage>(
    storage: &S,
    session_id: &str,
    limit: usize,
) -> Result<Vec<OperationLogEntry>, StorageError> {
    storage.list_log_entries(session_id, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NewShape;
    use crate::intent::{ChangeSet, Intent};
    use easel_core::{Color, Geometry, Point3, ShapeFilter, ShapeKind};
    use easel_storage::MemoryStorage;

    fn disc(x: f64) -> Mutation {
        Mutation::Insert(NewShape {
            kind: ShapeKind::Circle,
            geometry: Geometry::Disc {
                center: Point3::new(x, 0.0, 0.0),
                radius: 1.0,
            },
            color: Color::default(),
        })
    }

    async fn commit(storage: &MemoryStorage, plan: MutationPlan) -> CommitReport {
        let mut snap = storage.begin_snapshot().await.unwrap();
        let report = apply_plan(storage, &mut snap, "s1", &plan, "t").await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();
        report
    }

    async fn count(storage: &MemoryStorage) -> usize {
        storage.list_shapes(&ShapeFilter::default()).await.unwrap().len()
    }

    #[tokio::test]
    async fn batch_shares_one_id_and_single_does_not() {
        let storage = MemoryStorage::new();
        let single = commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(0.0)],
            },
        )
        .await;
        assert!(single.batch_id.is_none());

        let ids: Vec<String> = single.applied.iter().map(|s| s.id.clone()).collect();
        let more = commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(1.0), disc(2.0)],
            },
        )
        .await;
        assert!(more.batch_id.is_some());
        let log = storage.list_log_entries("s1", 0).await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].batch_id, more.batch_id);
        assert_eq!(log[1].batch_id, more.batch_id);
        assert_eq!(log[2].shape_id.as_deref(), Some(ids[0].as_str()));
    }

    #[tokio::test]
    async fn vanished_target_reported_not_fatal() {
        let storage = MemoryStorage::new();
        let created = commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(0.0)],
            },
        )
        .await;
        let id = created.applied[0].id.clone();
        let report = commit(
            &storage,
            MutationPlan {
                intent: Intent::Delete,
                mutations: vec![
                    Mutation::Delete { id: "ghost".into() },
                    Mutation::Delete { id: id.clone() },
                ],
            },
        )
        .await;
        assert_eq!(report.not_found, vec!["ghost".to_string()]);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(count(&storage).await, 0);
    }

    #[tokio::test]
    async fn update_logs_before_and_after() {
        let storage = MemoryStorage::new();
        let created = commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(0.0)],
            },
        )
        .await;
        let changes = ChangeSet {
            translate: Some(Point3::new(1.0, 0.0, 0.0)),
            ..ChangeSet::default()
        }
        .resolve()
        .unwrap();
        let report = commit(
            &storage,
            MutationPlan {
                intent: Intent::Modify,
                mutations: vec![Mutation::Update {
                    id: created.applied[0].id.clone(),
                    changes,
                }],
            },
        )
        .await;
        assert_eq!(report.applied[0].center(), Point3::new(1.0, 0.0, 0.0));
        let log = storage.list_log_entries("s1", 1).await.unwrap();
        assert_eq!(log[0].kind, OperationKind::Update);
        assert_eq!(
            log[0].before_state.as_ref().map(|s| s.center()),
            Some(Point3::ORIGIN)
        );
    }

    #[tokio::test]
    async fn undo_redo_with_nothing_to_do() {
        let storage = MemoryStorage::new();
        let undone = undo(&storage, "s1").await.unwrap();
        assert!(!undone.success);
        assert_eq!(undone.message, "Nothing to undo.");
        let redone = redo(&storage, "s1").await.unwrap();
        assert!(!redone.success);
    }

    async fn centers(storage: &MemoryStorage) -> Vec<Point3> {
        storage
            .list_shapes(&ShapeFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|s| s.center())
            .collect()
    }

    #[tokio::test]
    async fn redo_takes_most_recent_undone_entry() {
        let storage = MemoryStorage::new();
        for x in [0.0, 1.0] {
            commit(
                &storage,
                MutationPlan {
                    intent: Intent::Create,
                    mutations: vec![disc(x)],
                },
            )
            .await;
        }
        undo(&storage, "s1").await.unwrap();
        undo(&storage, "s1").await.unwrap();
        assert_eq!(count(&storage).await, 0);

        // Both creates are undone; the newer one comes back first.
        let redone = redo(&storage, "s1").await.unwrap();
        assert!(redone.success);
        assert_eq!(centers(&storage).await, vec![Point3::new(1.0, 0.0, 0.0)]);

        let redone = redo(&storage, "s1").await.unwrap();
        assert!(redone.success);
        assert_eq!(count(&storage).await, 2);
        assert!(!redo(&storage, "s1").await.unwrap().success);
    }

    #[tokio::test]
    async fn undone_entry_stays_redoable_after_new_mutation() {
        let storage = MemoryStorage::new();
        commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(0.0)],
            },
        )
        .await;
        undo(&storage, "s1").await.unwrap();
        commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(5.0)],
            },
        )
        .await;

        let redone = redo(&storage, "s1").await.unwrap();
        assert!(redone.success);
        let mut xs: Vec<f64> = centers(&storage).await.iter().map(|p| p.x).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(xs, vec![0.0, 5.0]);
    }

    #[tokio::test]
    async fn conflicting_undo_step_skipped_but_flag_flipped() {
        let storage = MemoryStorage::new();
        let created = commit(
            &storage,
            MutationPlan {
                intent: Intent::Create,
                mutations: vec![disc(0.0)],
            },
        )
        .await;
        // Remove the shape behind the log's back.
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .remove_shape(&mut snap, &created.applied[0].id)
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();

        let outcome = undo(&storage, "s1").await.unwrap();
        assert!(outcome.success);
        assert!(outcome.affected_shapes.is_empty());
        assert_eq!(outcome.skipped, vec![created.applied[0].id.clone()]);
        let log = storage.list_log_entries("s1", 0).await.unwrap();
        assert!(log[0].undone);
    }
}
