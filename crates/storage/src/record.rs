use std::fmt;
use std::str::FromStr;

use easel_core::{Color, Geometry, Shape};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// The kind of mutation an operation log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(StorageError::Backend(format!(
                "unknown operation kind '{other}'"
            ))),
        }
    }
}

/// An operation log entry as submitted by a writer. The backend assigns
/// `id` and initializes `undone = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub session_id: String,
    pub shape_id: Option<String>,
    pub kind: OperationKind,
    pub before_state: Option<Shape>,
    pub after_state: Option<Shape>,
    pub batch_id: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub occurred_at: String,
}

impl NewLogEntry {
    pub fn create(session_id: &str, after: Shape, batch_id: Option<String>, at: &str) -> Self {
        NewLogEntry {
            session_id: session_id.to_string(),
            shape_id: Some(after.id.clone()),
            kind: OperationKind::Create,
            before_state: None,
            after_state: Some(after),
            batch_id,
            occurred_at: at.to_string(),
        }
    }

    pub fn update(
        session_id: &str,
        before: Shape,
        after: Shape,
        batch_id: Option<String>,
        at: &str,
    ) -> Self {
        NewLogEntry {
            session_id: session_id.to_string(),
            shape_id: Some(before.id.clone()),
            kind: OperationKind::Update,
            before_state: Some(before),
            after_state: Some(after),
            batch_id,
            occurred_at: at.to_string(),
        }
    }

    pub fn delete(session_id: &str, before: Shape, batch_id: Option<String>, at: &str) -> Self {
        NewLogEntry {
            session_id: session_id.to_string(),
            shape_id: Some(before.id.clone()),
            kind: OperationKind::Delete,
            before_state: Some(before),
            after_state: None,
            batch_id,
            occurred_at: at.to_string(),
        }
    }

    /// Check the snapshot invariant for the entry's kind.
    ///
    /// create: no before, full after. delete: the reverse. update: both
    /// present, same id and kind.
    pub fn validate(&self) -> Result<(), StorageError> {
        match (self.kind, &self.before_state, &self.after_state) {
            (OperationKind::Create, None, Some(_)) | (OperationKind::Delete, Some(_), None) => {
                Ok(())
            }
            (OperationKind::Update, Some(before), Some(after)) => {
                if before.id != after.id || before.kind != after.kind {
                    Err(StorageError::MalformedEntry(format!(
                        "update of {} changes immutable fields",
                        before.id
                    )))
                } else {
                    Ok(())
                }
            }
            (kind, before, after) => Err(StorageError::MalformedEntry(format!(
                "{kind} entry with before_state {} and after_state {}",
                if before.is_some() { "set" } else { "null" },
                if after.is_some() { "set" } else { "null" },
            ))),
        }
    }
}

/// A stored operation log entry. Only `undone` ever changes after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: i64,
    pub session_id: String,
    pub shape_id: Option<String>,
    pub kind: OperationKind,
    pub before_state: Option<Shape>,
    pub after_state: Option<Shape>,
    pub batch_id: Option<String>,
    pub undone: bool,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub occurred_at: String,
}

impl OperationLogEntry {
    pub(crate) fn from_new(id: i64, entry: NewLogEntry) -> Self {
        OperationLogEntry {
            id,
            session_id: entry.session_id,
            shape_id: entry.shape_id,
            kind: entry.kind,
            before_state: entry.before_state,
            after_state: entry.after_state,
            batch_id: entry.batch_id,
            undone: false,
            occurred_at: entry.occurred_at,
        }
    }
}

/// In-place change to a stored shape. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapeDelta {
    pub geometry: Option<Geometry>,
    pub color: Option<Color>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

impl ShapeDelta {
    pub fn apply(&self, shape: &mut Shape) {
        if let Some(g) = &self.geometry {
            shape.geometry = g.clone();
        }
        if let Some(c) = &self.color {
            shape.color = c.clone();
        }
        shape.updated_at = self.updated_at.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// No turn in flight; a new submission may start.
    Idle,
    /// A turn is waiting on an external answer.
    Suspended,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Idle => "idle",
            ThreadStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for ThreadStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ThreadStatus::Idle),
            "suspended" => Ok(ThreadStatus::Suspended),
            other => Err(StorageError::Backend(format!(
                "unknown thread status '{other}'"
            ))),
        }
    }
}

/// One conversation message on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
}

/// Durable per-thread state: the frozen execution context and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub session_id: String,
    pub status: ThreadStatus,
    pub resume_token: Option<String>,
    /// Serialized execution context; opaque to storage.
    pub context: serde_json::Value,
    pub history: Vec<ThreadMessage>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}
