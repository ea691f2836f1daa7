//! SQLite backend.
//!
//! Two connections to one database file in WAL mode: a writer owned by
//! the open snapshot (`BEGIN IMMEDIATE` ... `COMMIT`), and a reader for
//! queries, which therefore only ever see committed state.
//!
//! rusqlite is synchronous, so every statement runs on tokio's blocking
//! pool; the connection travels into the blocking task and back.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use easel_core::{Color, Shape, ShapeFilter, ShapeKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StorageError;
use crate::record::{
    NewLogEntry, OperationKind, OperationLogEntry, ShapeDelta, ThreadRecord, ThreadStatus,
};
use crate::traits::SceneStorage;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS shapes (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    geometry    TEXT NOT NULL,
    color       TEXT NOT NULL,
    sequence    INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shapes_kind_sequence ON shapes(kind, sequence DESC);

CREATE TABLE IF NOT EXISTS shape_operations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL,
    shape_id     TEXT,
    kind         TEXT NOT NULL,
    before_state TEXT,
    after_state  TEXT,
    batch_id     TEXT,
    undone       INTEGER NOT NULL DEFAULT 0,
    occurred_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shape_operations_session ON shape_operations(session_id, id DESC);
CREATE INDEX IF NOT EXISTS idx_shape_operations_batch ON shape_operations(batch_id);

CREATE TABLE IF NOT EXISTS threads (
    thread_id    TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL,
    status       TEXT NOT NULL,
    resume_token TEXT,
    context      TEXT NOT NULL,
    history      TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS counters (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const SHAPE_COLUMNS: &str = "id, kind, geometry, color, sequence, created_at, updated_at";
const ENTRY_COLUMNS: &str =
    "id, session_id, shape_id, kind, before_state, after_state, batch_id, undone, occurred_at";
const THREAD_COLUMNS: &str =
    "thread_id, session_id, status, resume_token, context, history, updated_at";

pub struct SqliteStorage {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<std::sync::Mutex<Connection>>,
}

/// An open `BEGIN IMMEDIATE` transaction on the writer connection.
/// Rolled back on drop unless committed.
pub struct SqliteSnapshot {
    /// `None` only while a statement is running on the blocking pool, or
    /// after that task panicked.
    conn: Option<OwnedMutexGuard<Connection>>,
    open: bool,
}

impl SqliteSnapshot {
    /// Run `f` against the transaction's connection on the blocking pool.
    async fn run<T, F>(&mut self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StorageError::Backend("snapshot connection lost".into()))?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await
        .map_err(StorageError::backend)?;
        self.conn = Some(conn);
        result
    }
}

impl Drop for SqliteSnapshot {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Some(conn) = self.conn.as_ref() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback of dropped snapshot failed");
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path).map_err(StorageError::backend)?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(StorageError::backend)?;
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
        .map_err(StorageError::backend)?;
    Ok(conn)
}

impl SqliteStorage {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let writer = open_connection(path)?;
        writer
            .execute_batch(SCHEMA)
            .map_err(StorageError::backend)?;
        let reader = open_connection(path)?;
        tracing::debug!(path = %path.display(), "opened sqlite scene store");
        Ok(SqliteStorage {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(std::sync::Mutex::new(reader)),
        })
    }

    /// Run `f` against the reader connection on the blocking pool.
    async fn read<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let reader = Arc::clone(&self.reader);
        tokio::task::spawn_blocking(move || {
            let conn = reader
                .lock()
                .map_err(|_| StorageError::Backend("reader lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(StorageError::backend)?
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(StorageError::backend)
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StorageError> {
    serde_json::from_str(text).map_err(StorageError::backend)
}

struct RawShape {
    id: String,
    kind: String,
    geometry: String,
    color: String,
    sequence: i64,
    created_at: String,
    updated_at: String,
}

fn raw_shape(row: &Row<'_>) -> rusqlite::Result<RawShape> {
    Ok(RawShape {
        id: row.get(0)?,
        kind: row.get(1)?,
        geometry: row.get(2)?,
        color: row.get(3)?,
        sequence: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl RawShape {
    fn into_shape(self) -> Result<Shape, StorageError> {
        let shape = Shape {
            kind: self.kind.parse::<ShapeKind>().map_err(StorageError::Backend)?,
            geometry: from_json(&self.geometry)?,
            color: Color::parse(&self.color).map_err(StorageError::backend)?,
            sequence: self.sequence as u64,
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        StorageError::check_shape(&shape)?;
        Ok(shape)
    }
}

struct RawEntry {
    id: i64,
    session_id: String,
    shape_id: Option<String>,
    kind: String,
    before_state: Option<String>,
    after_state: Option<String>,
    batch_id: Option<String>,
    undone: bool,
    occurred_at: String,
}

fn raw_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        shape_id: row.get(2)?,
        kind: row.get(3)?,
        before_state: row.get(4)?,
        after_state: row.get(5)?,
        batch_id: row.get(6)?,
        undone: row.get(7)?,
        occurred_at: row.get(8)?,
    })
}

impl RawEntry {
    fn into_entry(self) -> Result<OperationLogEntry, StorageError> {
        Ok(OperationLogEntry {
            id: self.id,
            session_id: self.session_id,
            shape_id: self.shape_id,
            kind: self.kind.parse::<OperationKind>()?,
            before_state: self.before_state.as_deref().map(from_json).transpose()?,
            after_state: self.after_state.as_deref().map(from_json).transpose()?,
            batch_id: self.batch_id,
            undone: self.undone,
            occurred_at: self.occurred_at,
        })
    }
}

struct RawThread {
    thread_id: String,
    session_id: String,
    status: String,
    resume_token: Option<String>,
    context: String,
    history: String,
    updated_at: String,
}

fn raw_thread(row: &Row<'_>) -> rusqlite::Result<RawThread> {
    Ok(RawThread {
        thread_id: row.get(0)?,
        session_id: row.get(1)?,
        status: row.get(2)?,
        resume_token: row.get(3)?,
        context: row.get(4)?,
        history: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl RawThread {
    fn into_record(self) -> Result<ThreadRecord, StorageError> {
        Ok(ThreadRecord {
            thread_id: self.thread_id,
            session_id: self.session_id,
            status: self.status.parse::<ThreadStatus>()?,
            resume_token: self.resume_token,
            context: from_json(&self.context)?,
            history: from_json(&self.history)?,
            updated_at: self.updated_at,
        })
    }
}

// ── Statement helpers (synchronous, no await while a statement is live) ─────

fn query_shape(conn: &Connection, id: &str) -> Result<Shape, StorageError> {
    let sql = format!("SELECT {SHAPE_COLUMNS} FROM shapes WHERE id = ?1");
    conn.query_row(&sql, params![id], raw_shape)
        .optional()
        .map_err(StorageError::backend)?
        .ok_or_else(|| StorageError::ShapeNotFound { id: id.to_string() })?
        .into_shape()
}

fn query_shapes(
    conn: &Connection,
    kind: Option<ShapeKind>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Shape>, StorageError> {
    let sql = format!(
        "SELECT {SHAPE_COLUMNS} FROM shapes
         WHERE (?1 IS NULL OR kind = ?1)
         ORDER BY sequence DESC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql).map_err(StorageError::backend)?;
    let rows = stmt
        .query_map(params![kind.map(|k| k.as_str()), limit, offset], raw_shape)
        .map_err(StorageError::backend)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(StorageError::backend)?;
    rows.into_iter().map(RawShape::into_shape).collect()
}

fn query_entries(
    conn: &Connection,
    where_clause: &str,
    order: &str,
    limit: i64,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<OperationLogEntry>, StorageError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM shape_operations WHERE {where_clause} ORDER BY id {order} LIMIT {limit}"
    );
    let mut stmt = conn.prepare(&sql).map_err(StorageError::backend)?;
    let rows = stmt
        .query_map(args, raw_entry)
        .map_err(StorageError::backend)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(StorageError::backend)?;
    rows.into_iter().map(RawEntry::into_entry).collect()
}

fn query_thread(conn: &Connection, thread_id: &str) -> Result<ThreadRecord, StorageError> {
    let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE thread_id = ?1");
    conn.query_row(&sql, params![thread_id], raw_thread)
        .optional()
        .map_err(StorageError::backend)?
        .ok_or_else(|| StorageError::ThreadNotFound {
            thread_id: thread_id.to_string(),
        })?
        .into_record()
}

fn write_shape(conn: &Connection, shape: &Shape, insert: bool) -> Result<usize, StorageError> {
    let sql = if insert {
        "INSERT INTO shapes (id, kind, geometry, color, sequence, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    } else {
        "UPDATE shapes SET kind = ?2, geometry = ?3, color = ?4, sequence = ?5,
                created_at = ?6, updated_at = ?7
         WHERE id = ?1"
    };
    conn.execute(
        sql,
        params![
            shape.id,
            shape.kind.as_str(),
            to_json(&shape.geometry)?,
            shape.color.as_str(),
            shape.sequence as i64,
            shape.created_at,
            shape.updated_at,
        ],
    )
    .map_err(StorageError::backend)
}

#[async_trait]
impl SceneStorage for SqliteStorage {
    type Snapshot = SqliteSnapshot;

    async fn begin_snapshot(&self) -> Result<SqliteSnapshot, StorageError> {
        let conn = self.writer.clone().lock_owned().await;
        let mut snapshot = SqliteSnapshot {
            conn: Some(conn),
            open: false,
        };
        snapshot
            .run(|conn| {
                // Left open by a snapshot whose blocking task never returned.
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK")
                        .map_err(StorageError::backend)?;
                }
                conn.execute_batch("BEGIN IMMEDIATE")
                    .map_err(StorageError::backend)
            })
            .await?;
        snapshot.open = true;
        Ok(snapshot)
    }

    async fn commit_snapshot(&self, mut snapshot: SqliteSnapshot) -> Result<(), StorageError> {
        snapshot
            .run(|conn| conn.execute_batch("COMMIT").map_err(StorageError::backend))
            .await?;
        snapshot.open = false;
        Ok(())
    }

    async fn abort_snapshot(&self, mut snapshot: SqliteSnapshot) -> Result<(), StorageError> {
        snapshot.open = false;
        snapshot
            .run(|conn| conn.execute_batch("ROLLBACK").map_err(StorageError::backend))
            .await
    }

    async fn next_shape_sequence(&self, snapshot: &mut SqliteSnapshot) -> Result<u64, StorageError> {
        snapshot
            .run(|conn| {
                let value: i64 = conn
                    .query_row(
                        "INSERT INTO counters (name, value) VALUES ('shape_sequence', 1)
                         ON CONFLICT(name) DO UPDATE SET value = value + 1
                         RETURNING value",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(StorageError::backend)?;
                Ok(value as u64)
            })
            .await
    }

    async fn insert_shape(
        &self,
        snapshot: &mut SqliteSnapshot,
        shape: Shape,
    ) -> Result<(), StorageError> {
        snapshot
            .run(move |conn| {
                let exists: bool = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM shapes WHERE id = ?1)",
                        params![shape.id],
                        |row| row.get(0),
                    )
                    .map_err(StorageError::backend)?;
                if exists {
                    return Err(StorageError::AlreadyExists { id: shape.id });
                }
                StorageError::check_shape(&shape)?;
                write_shape(conn, &shape, true)?;
                Ok(())
            })
            .await
    }

    async fn get_shape_for_update(
        &self,
        snapshot: &mut SqliteSnapshot,
        id: &str,
    ) -> Result<Shape, StorageError> {
        let id = id.to_string();
        snapshot.run(move |conn| query_shape(conn, &id)).await
    }

    async fn update_shape(
        &self,
        snapshot: &mut SqliteSnapshot,
        id: &str,
        delta: ShapeDelta,
    ) -> Result<Shape, StorageError> {
        let id = id.to_string();
        snapshot
            .run(move |conn| {
                let mut shape = query_shape(conn, &id)?;
                delta.apply(&mut shape);
                StorageError::check_shape(&shape)?;
                write_shape(conn, &shape, false)?;
                Ok(shape)
            })
            .await
    }

    async fn replace_shape(
        &self,
        snapshot: &mut SqliteSnapshot,
        shape: Shape,
    ) -> Result<(), StorageError> {
        StorageError::check_shape(&shape)?;
        snapshot
            .run(move |conn| match write_shape(conn, &shape, false)? {
                0 => Err(StorageError::ShapeNotFound { id: shape.id }),
                _ => Ok(()),
            })
            .await
    }

    async fn remove_shape(
        &self,
        snapshot: &mut SqliteSnapshot,
        id: &str,
    ) -> Result<Shape, StorageError> {
        let id = id.to_string();
        snapshot
            .run(move |conn| {
                let shape = query_shape(conn, &id)?;
                conn.execute("DELETE FROM shapes WHERE id = ?1", params![id])
                    .map_err(StorageError::backend)?;
                Ok(shape)
            })
            .await
    }

    async fn append_log_entry(
        &self,
        snapshot: &mut SqliteSnapshot,
        entry: NewLogEntry,
    ) -> Result<OperationLogEntry, StorageError> {
        entry.validate()?;
        let before = entry.before_state.as_ref().map(to_json).transpose()?;
        let after = entry.after_state.as_ref().map(to_json).transpose()?;
        snapshot
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO shape_operations
                     (session_id, shape_id, kind, before_state, after_state, batch_id, undone, occurred_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                    params![
                        entry.session_id,
                        entry.shape_id,
                        entry.kind.as_str(),
                        before,
                        after,
                        entry.batch_id,
                        entry.occurred_at,
                    ],
                )
                .map_err(StorageError::backend)?;
                Ok(OperationLogEntry::from_new(conn.last_insert_rowid(), entry))
            })
            .await
    }

    async fn set_undone(
        &self,
        snapshot: &mut SqliteSnapshot,
        entry_id: i64,
        undone: bool,
    ) -> Result<(), StorageError> {
        snapshot
            .run(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE shape_operations SET undone = ?2 WHERE id = ?1",
                        params![entry_id, undone],
                    )
                    .map_err(StorageError::backend)?;
                if changed == 0 {
                    return Err(StorageError::EntryNotFound { id: entry_id });
                }
                Ok(())
            })
            .await
    }

    async fn last_active_entry(
        &self,
        snapshot: &mut SqliteSnapshot,
        session_id: &str,
    ) -> Result<Option<OperationLogEntry>, StorageError> {
        let session_id = session_id.to_string();
        snapshot
            .run(move |conn| {
                Ok(query_entries(conn, "session_id = ?1 AND undone = 0", "DESC", 1, &[&session_id])?
                    .pop())
            })
            .await
    }

    async fn last_undone_entry(
        &self,
        snapshot: &mut SqliteSnapshot,
        session_id: &str,
    ) -> Result<Option<OperationLogEntry>, StorageError> {
        let session_id = session_id.to_string();
        snapshot
            .run(move |conn| {
                Ok(query_entries(conn, "session_id = ?1 AND undone = 1", "DESC", 1, &[&session_id])?
                    .pop())
            })
            .await
    }

    async fn batch_entries(
        &self,
        snapshot: &mut SqliteSnapshot,
        session_id: &str,
        batch_id: &str,
    ) -> Result<Vec<OperationLogEntry>, StorageError> {
        let session_id = session_id.to_string();
        let batch_id = batch_id.to_string();
        snapshot
            .run(move |conn| {
                query_entries(
                    conn,
                    "session_id = ?1 AND batch_id = ?2",
                    "ASC",
                    -1,
                    &[&session_id, &batch_id],
                )
            })
            .await
    }

    async fn put_thread(
        &self,
        snapshot: &mut SqliteSnapshot,
        record: ThreadRecord,
    ) -> Result<(), StorageError> {
        let context = to_json(&record.context)?;
        let history = to_json(&record.history)?;
        snapshot
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO threads (thread_id, session_id, status, resume_token, context, history, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(thread_id) DO UPDATE SET
                        session_id = excluded.session_id,
                        status = excluded.status,
                        resume_token = excluded.resume_token,
                        context = excluded.context,
                        history = excluded.history,
                        updated_at = excluded.updated_at",
                    params![
                        record.thread_id,
                        record.session_id,
                        record.status.as_str(),
                        record.resume_token,
                        context,
                        history,
                        record.updated_at,
                    ],
                )
                .map_err(StorageError::backend)?;
                Ok(())
            })
            .await
    }

    async fn get_thread_for_update(
        &self,
        snapshot: &mut SqliteSnapshot,
        thread_id: &str,
    ) -> Result<ThreadRecord, StorageError> {
        let thread_id = thread_id.to_string();
        snapshot.run(move |conn| query_thread(conn, &thread_id)).await
    }

    async fn get_shape(&self, id: &str) -> Result<Shape, StorageError> {
        let id = id.to_string();
        self.read(move |conn| query_shape(conn, &id)).await
    }

    async fn list_shapes(&self, filter: &ShapeFilter) -> Result<Vec<Shape>, StorageError> {
        let kind = filter.kind;
        let shapes = self.read(move |conn| query_shapes(conn, kind, -1, 0)).await?;
        Ok(shapes.into_iter().filter(|s| filter.matches(s)).collect())
    }

    async fn count_by_kind(&self) -> Result<BTreeMap<ShapeKind, usize>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT kind, COUNT(*) FROM shapes GROUP BY kind")
                .map_err(StorageError::backend)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(StorageError::backend)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::backend)?;
            let mut counts = BTreeMap::new();
            for (kind, n) in rows {
                let kind = kind.parse::<ShapeKind>().map_err(StorageError::Backend)?;
                counts.insert(kind, n as usize);
            }
            Ok(counts)
        })
        .await
    }

    async fn last_created(
        &self,
        kind: Option<ShapeKind>,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Shape>, StorageError> {
        self.read(move |conn| query_shapes(conn, kind, count as i64, offset as i64))
            .await
    }

    async fn list_log_entries(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<OperationLogEntry>, StorageError> {
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let session_id = session_id.to_string();
        self.read(move |conn| query_entries(conn, "session_id = ?1", "DESC", limit, &[&session_id]))
            .await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<ThreadRecord, StorageError> {
        let thread_id = thread_id.to_string();
        self.read(move |conn| query_thread(conn, &thread_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn sqlite_conformance() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        let report = run_conformance_suite(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let path = dir.path().join(format!("scene-{n}.db"));
            async move { SqliteStorage::open(path).unwrap() }
        })
        .await;
        assert!(report.failed == 0, "{report}");
    }

    #[tokio::test]
    async fn reopening_preserves_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            let mut snap = storage.begin_snapshot().await.unwrap();
            let seq = storage.next_shape_sequence(&mut snap).await.unwrap();
            let shape = crate::conformance::make_shape("persisted", ShapeKind::Circle, seq);
            storage.insert_shape(&mut snap, shape).await.unwrap();
            storage.commit_snapshot(snap).await.unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        let shape = storage.get_shape("persisted").await.unwrap();
        assert_eq!(shape.kind, ShapeKind::Circle);

        let mut snap = storage.begin_snapshot().await.unwrap();
        let next = storage.next_shape_sequence(&mut snap).await.unwrap();
        assert!(next > shape.sequence);
    }

    #[tokio::test]
    async fn mismatched_row_rejected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.db");
        let storage = SqliteStorage::open(&path).unwrap();

        let disc = easel_core::Geometry::Disc {
            center: easel_core::Point3::ORIGIN,
            radius: 1.0,
        };
        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "INSERT INTO shapes (id, kind, geometry, color, sequence, created_at, updated_at)
             VALUES ('odd', 'triangle', ?1, '#00ff88', 1, 't', 't')",
            params![to_json(&disc).unwrap()],
        )
        .unwrap();

        match storage.get_shape("odd").await {
            Err(StorageError::InvalidShape { id, .. }) => assert_eq!(id, "odd"),
            other => panic!("expected InvalidShape, got {other:?}"),
        }
    }
}
