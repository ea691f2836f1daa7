//! easel-storage: the persistence boundary for shapes, the operation log,
//! and per-thread execution records.
//!
//! Every mutation goes through a [`SceneStorage::Snapshot`], which is both a
//! transaction and the global writer lock. Two backends ship with the crate:
//! [`MemoryStorage`] for tests and embedding, and [`SqliteStorage`] for
//! durable use. Both are checked by the [`conformance`] suite.

pub mod conformance;
mod error;
mod memory;
mod record;
mod sqlite;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    NewLogEntry, OperationKind, OperationLogEntry, ShapeDelta, ThreadMessage, ThreadRecord,
    ThreadStatus,
};
pub use sqlite::{SqliteSnapshot, SqliteStorage};
pub use traits::SceneStorage;
