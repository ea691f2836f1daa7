use std::collections::BTreeMap;

use async_trait::async_trait;
use easel_core::{Shape, ShapeFilter, ShapeKind};

use crate::error::StorageError;
use crate::record::{NewLogEntry, OperationLogEntry, ShapeDelta, ThreadRecord};

/// The storage trait for the Easel entity store and operation log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back.
///
/// A snapshot is also the global writer lock: at most one snapshot is open
/// at a time, and `begin_snapshot` waits for the current holder. Queries
/// outside a snapshot never block on the writer and only see committed
/// state.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait SceneStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot, waiting for the writer lock.
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Shape operations (within snapshot) ────────────────────────────────────

    /// Allocate the next insertion sequence number, greater than any
    /// sequence committed so far.
    async fn next_shape_sequence(&self, snapshot: &mut Self::Snapshot)
        -> Result<u64, StorageError>;

    /// Insert a shape.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the id is taken and
    /// `Err(StorageError::InvalidShape)` if its geometry does not fit its kind.
    async fn insert_shape(
        &self,
        snapshot: &mut Self::Snapshot,
        shape: Shape,
    ) -> Result<(), StorageError>;

    /// Read a shape as seen by this snapshot.
    ///
    /// Returns `Err(StorageError::ShapeNotFound)` if it does not exist.
    async fn get_shape_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
    ) -> Result<Shape, StorageError>;

    /// Apply `delta` to a shape and return the updated shape.
    async fn update_shape(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
        delta: ShapeDelta,
    ) -> Result<Shape, StorageError>;

    /// Overwrite a shape wholesale with `shape` (matched by id). The same
    /// kind/geometry check as `insert_shape` applies.
    async fn replace_shape(
        &self,
        snapshot: &mut Self::Snapshot,
        shape: Shape,
    ) -> Result<(), StorageError>;

    /// Remove a shape, returning its last state.
    async fn remove_shape(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
    ) -> Result<Shape, StorageError>;

    // ── Operation log (within snapshot) ──────────────────────────────────────

    /// Append an entry and return it with its assigned id. Ids are monotonic.
    ///
    /// Returns `Err(StorageError::MalformedEntry)` if the entry violates
    /// its kind's snapshot invariant.
    async fn append_log_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: NewLogEntry,
    ) -> Result<OperationLogEntry, StorageError>;

    /// Flip an entry's `undone` flag. The only mutation entries ever see.
    async fn set_undone(
        &self,
        snapshot: &mut Self::Snapshot,
        entry_id: i64,
        undone: bool,
    ) -> Result<(), StorageError>;

    /// The session's most recent entry with `undone = false`.
    async fn last_active_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        session_id: &str,
    ) -> Result<Option<OperationLogEntry>, StorageError>;

    /// The session's most recent entry with `undone = true`.
    async fn last_undone_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        session_id: &str,
    ) -> Result<Option<OperationLogEntry>, StorageError>;

    /// All of the session's entries carrying `batch_id`, oldest first.
    async fn batch_entries(
        &self,
        snapshot: &mut Self::Snapshot,
        session_id: &str,
        batch_id: &str,
    ) -> Result<Vec<OperationLogEntry>, StorageError>;

    // ── Thread records (within snapshot) ──────────────────────────────────────

    /// Insert or overwrite a thread record.
    async fn put_thread(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ThreadRecord,
    ) -> Result<(), StorageError>;

    /// Read a thread record as seen by this snapshot.
    ///
    /// Returns `Err(StorageError::ThreadNotFound)` if it does not exist.
    async fn get_thread_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        thread_id: &str,
    ) -> Result<ThreadRecord, StorageError>;

    // ── Query operations (outside snapshot, committed state only) ─────────────

    /// Returns `Err(StorageError::ShapeNotFound)` if the shape does not exist.
    async fn get_shape(&self, id: &str) -> Result<Shape, StorageError>;

    /// All shapes matching `filter`, newest (highest sequence) first.
    async fn list_shapes(&self, filter: &ShapeFilter) -> Result<Vec<Shape>, StorageError>;

    /// Number of shapes per kind. Kinds with no shapes are omitted.
    async fn count_by_kind(&self) -> Result<BTreeMap<ShapeKind, usize>, StorageError>;

    /// Up to `count` shapes of `kind` (any kind when `None`), newest first,
    /// after skipping the `offset` most recent.
    async fn last_created(
        &self,
        kind: Option<ShapeKind>,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Shape>, StorageError>;

    /// The session's most recent log entries, newest first (`limit = 0`: all).
    async fn list_log_entries(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<OperationLogEntry>, StorageError>;

    /// Returns `Err(StorageError::ThreadNotFound)` if the thread does not exist.
    async fn get_thread(&self, thread_id: &str) -> Result<ThreadRecord, StorageError>;
}
