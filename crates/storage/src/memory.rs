//! In-memory backend.
//!
//! Committed state lives behind a `RwLock`; a snapshot takes the writer
//! mutex and works on a private copy, which replaces the committed state
//! on commit. Dropping a snapshot discards the copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use easel_core::{Shape, ShapeFilter, ShapeKind};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StorageError;
use crate::record::{NewLogEntry, OperationLogEntry, ShapeDelta, ThreadRecord};
use crate::traits::SceneStorage;

#[derive(Debug, Clone, Default)]
struct State {
    shapes: HashMap<String, Shape>,
    log: Vec<OperationLogEntry>,
    threads: HashMap<String, ThreadRecord>,
    next_entry_id: i64,
    next_sequence: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    committed: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
}

pub struct MemorySnapshot {
    _guard: OwnedMutexGuard<()>,
    staged: State,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StorageError> {
        let state = self
            .committed
            .read()
            .map_err(|_| StorageError::Backend("state lock poisoned".into()))?;
        Ok(f(&state))
    }
}

fn sorted_newest_first(mut shapes: Vec<Shape>) -> Vec<Shape> {
    shapes.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    shapes
}

#[async_trait]
impl SceneStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let guard = self.writer.clone().lock_owned().await;
        let staged = self.read(|s| s.clone())?;
        Ok(MemorySnapshot {
            _guard: guard,
            staged,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut state = self
            .committed
            .write()
            .map_err(|_| StorageError::Backend("state lock poisoned".into()))?;
        *state = snapshot.staged;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn next_shape_sequence(&self, snapshot: &mut MemorySnapshot) -> Result<u64, StorageError> {
        snapshot.staged.next_sequence += 1;
        Ok(snapshot.staged.next_sequence)
    }

    async fn insert_shape(
        &self,
        snapshot: &mut MemorySnapshot,
        shape: Shape,
    ) -> Result<(), StorageError> {
        if snapshot.staged.shapes.contains_key(&shape.id) {
            return Err(StorageError::AlreadyExists { id: shape.id });
        }
        StorageError::check_shape(&shape)?;
        snapshot.staged.shapes.insert(shape.id.clone(), shape);
        Ok(())
    }

    async fn get_shape_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
    ) -> Result<Shape, StorageError> {
        snapshot
            .staged
            .shapes
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::ShapeNotFound { id: id.to_string() })
    }

    async fn update_shape(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
        delta: ShapeDelta,
    ) -> Result<Shape, StorageError> {
        let shape = snapshot
            .staged
            .shapes
            .get_mut(id)
            .ok_or_else(|| StorageError::ShapeNotFound { id: id.to_string() })?;
        let mut updated = shape.clone();
        delta.apply(&mut updated);
        StorageError::check_shape(&updated)?;
        *shape = updated.clone();
        Ok(updated)
    }

    async fn replace_shape(
        &self,
        snapshot: &mut MemorySnapshot,
        shape: Shape,
    ) -> Result<(), StorageError> {
        StorageError::check_shape(&shape)?;
        match snapshot.staged.shapes.get_mut(&shape.id) {
            Some(existing) => {
                *existing = shape;
                Ok(())
            }
            None => Err(StorageError::ShapeNotFound { id: shape.id }),
        }
    }

    async fn remove_shape(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
    ) -> Result<Shape, StorageError> {
        snapshot
            .staged
            .shapes
            .remove(id)
            .ok_or_else(|| StorageError::ShapeNotFound { id: id.to_string() })
    }

    async fn append_log_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: NewLogEntry,
    ) -> Result<OperationLogEntry, StorageError> {
        entry.validate()?;
        snapshot.staged.next_entry_id += 1;
        let stored = OperationLogEntry::from_new(snapshot.staged.next_entry_id, entry);
        snapshot.staged.log.push(stored.clone());
        Ok(stored)
    }

    async fn set_undone(
        &self,
        snapshot: &mut MemorySnapshot,
        entry_id: i64,
        undone: bool,
    ) -> Result<(), StorageError> {
        let entry = snapshot
            .staged
            .log
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(StorageError::EntryNotFound { id: entry_id })?;
        entry.undone = undone;
        Ok(())
    }

    async fn last_active_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        session_id: &str,
    ) -> Result<Option<OperationLogEntry>, StorageError> {
        Ok(snapshot
            .staged
            .log
            .iter()
            .rev()
            .find(|e| e.session_id == session_id && !e.undone)
            .cloned())
    }

    async fn last_undone_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        session_id: &str,
    ) -> Result<Option<OperationLogEntry>, StorageError> {
        Ok(snapshot
            .staged
            .log
            .iter()
            .rev()
            .find(|e| e.session_id == session_id && e.undone)
            .cloned())
    }

    async fn batch_entries(
        &self,
        snapshot: &mut MemorySnapshot,
        session_id: &str,
        batch_id: &str,
    ) -> Result<Vec<OperationLogEntry>, StorageError> {
        Ok(snapshot
            .staged
            .log
            .iter()
            .filter(|e| e.session_id == session_id && e.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn put_thread(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ThreadRecord,
    ) -> Result<(), StorageError> {
        snapshot
            .staged
            .threads
            .insert(record.thread_id.clone(), record);
        Ok(())
    }

    async fn get_thread_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        thread_id: &str,
    ) -> Result<ThreadRecord, StorageError> {
        snapshot
            .staged
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| StorageError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })
    }

    async fn get_shape(&self, id: &str) -> Result<Shape, StorageError> {
        self.read(|s| s.shapes.get(id).cloned())?
            .ok_or_else(|| StorageError::ShapeNotFound { id: id.to_string() })
    }

    async fn list_shapes(&self, filter: &ShapeFilter) -> Result<Vec<Shape>, StorageError> {
        let shapes = self.read(|s| {
            s.shapes
                .values()
                .filter(|shape| filter.matches(shape))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(sorted_newest_first(shapes))
    }

    async fn count_by_kind(&self) -> Result<BTreeMap<ShapeKind, usize>, StorageError> {
        self.read(|s| {
            let mut counts = BTreeMap::new();
            for shape in s.shapes.values() {
                *counts.entry(shape.kind).or_insert(0) += 1;
            }
            counts
        })
    }

    async fn last_created(
        &self,
        kind: Option<ShapeKind>,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Shape>, StorageError> {
        let filter = ShapeFilter { kind, color: None };
        let shapes = self.list_shapes(&filter).await?;
        Ok(shapes.into_iter().skip(offset).take(count).collect())
    }

    async fn list_log_entries(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<OperationLogEntry>, StorageError> {
        let limit = if limit == 0 { usize::MAX } else { limit };
        self.read(|s| {
            s.log
                .iter()
                .rev()
                .filter(|e| e.session_id == session_id)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<ThreadRecord, StorageError> {
        self.read(|s| s.threads.get(thread_id).cloned())?
            .ok_or_else(|| StorageError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn memory_conformance() {
        let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
        assert!(report.failed == 0, "{report}");
    }
}
