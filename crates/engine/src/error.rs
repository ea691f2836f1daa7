use easel_storage::StorageError;
use serde::{Deserialize, Serialize};

/// Failure categories reported to callers.
///
/// Classification, validation and not-found failures travel inside a
/// completed turn outcome. Concurrency and storage failures surface as
/// [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The oracle could not produce a usable intent.
    Classification,
    /// Parameters were understood but rejected, or no target resolved.
    Validation,
    /// An explicitly named shape does not exist.
    NotFound,
    /// The thread is busy or the resume token is stale.
    Concurrency,
    /// The storage backend failed; nothing was committed.
    Storage,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Classification => "classification",
            FailureKind::Validation => "validation",
            FailureKind::NotFound => "not_found",
            FailureKind::Concurrency => "concurrency",
            FailureKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the orchestrator instead of a turn outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Another turn is running on this thread, or it awaits an answer.
    #[error("thread {thread_id} is busy")]
    ThreadBusy { thread_id: String },

    /// A resume arrived for a thread with no outstanding suspension.
    #[error("thread {thread_id} has no pending suspension")]
    NoPendingSuspension { thread_id: String },

    /// The resume token does not match the outstanding suspension.
    #[error("resume token for thread {thread_id} is stale or unknown")]
    TokenMismatch { thread_id: String },

    /// The caller did not supply a session id.
    #[error("a session id is required")]
    MissingSession,

    /// The thread belongs to a different session.
    #[error("thread {thread_id} belongs to another session")]
    SessionMismatch { thread_id: String },

    /// A task phase transition the state machine does not allow.
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The persisted execution context could not be read back.
    #[error("corrupt execution context: {0}")]
    CorruptContext(String),
}

impl EngineError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EngineError::ThreadBusy { .. }
            | EngineError::NoPendingSuspension { .. }
            | EngineError::TokenMismatch { .. } => FailureKind::Concurrency,
            EngineError::MissingSession | EngineError::SessionMismatch { .. } => {
                FailureKind::Validation
            }
            EngineError::InvalidTransition { .. }
            | EngineError::Storage(_)
            | EngineError::CorruptContext(_) => FailureKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_errors_classified() {
        let busy = EngineError::ThreadBusy {
            thread_id: "t".into(),
        };
        let stale = EngineError::TokenMismatch {
            thread_id: "t".into(),
        };
        assert_eq!(busy.failure_kind(), FailureKind::Concurrency);
        assert_eq!(stale.failure_kind(), FailureKind::Concurrency);
    }

    #[test]
    fn storage_error_wraps_transparently() {
        let err: EngineError = StorageError::Backend("disk full".into()).into();
        assert_eq!(err.failure_kind(), FailureKind::Storage);
        assert_eq!(err.to_string(), "storage backend error: disk full");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
