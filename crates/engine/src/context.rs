//! Per-thread execution context: the state a task carries across a
//! suspension. It is frozen into [`ThreadRecord::context`] as JSON.
//!
//! [`ThreadRecord::context`]: easel_storage::ThreadRecord

use easel_core::Shape;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::intent::{Intent, IntentRequest};
use crate::suspension::{ExternalAnswer, SuspendRequest};

/// Lifecycle of one task.
///
/// ```text
/// ParsePending ─┬─> Suspended ─┬─> Resolved ──> Committed
///               ├─> Resolved   └─> Failed        └─> Failed
///               └─> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    #[default]
    ParsePending,
    Suspended,
    Resolved,
    Committed,
    Failed,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::ParsePending => "parse_pending",
            TaskPhase::Suspended => "suspended",
            TaskPhase::Resolved => "resolved",
            TaskPhase::Committed => "committed",
            TaskPhase::Failed => "failed",
        }
    }

    fn allows(&self, to: TaskPhase) -> bool {
        use TaskPhase::*;
        matches!(
            (self, to),
            (ParsePending, Suspended | Resolved | Failed)
                | (Suspended, Resolved | Failed)
                | (Resolved, Committed | Failed)
        )
    }
}

/// Everything a task needs to continue after a suspension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionContext {
    pub intent: Option<Intent>,
    pub operation_params: Option<IntentRequest>,
    /// The outstanding request while suspended.
    pub pending: Option<SuspendRequest>,
    /// Merged in by the suspension broker on resume.
    pub external_answer: Option<ExternalAnswer>,
    /// Set only by the suspension broker. The router re-enters the stored
    /// intent iff this is true.
    pub resumed: bool,
    pub phase: TaskPhase,
    pub created_object: Option<Shape>,
    pub modified_objects: Vec<Shape>,
    pub target_object_ids: Vec<String>,
}

impl ExecutionContext {
    pub fn advance(&mut self, to: TaskPhase) -> Result<(), EngineError> {
        if !self.phase.allows(to) {
            return Err(EngineError::InvalidTransition {
                from: self.phase.as_str(),
                to: to.as_str(),
            });
        }
        tracing::debug!(from = self.phase.as_str(), to = to.as_str(), "task phase");
        self.phase = to;
        Ok(())
    }

    /// Reset to a fresh context, as after a completed or abandoned turn.
    pub fn clear(&mut self) {
        *self = ExecutionContext::default();
    }

    pub fn to_json(&self) -> Result<serde_json::Value, EngineError> {
        serde_json::to_value(self).map_err(|e| EngineError::CorruptContext(e.to_string()))
    }

    /// Read a context back from a thread record. An empty object or null
    /// yields a fresh context.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, EngineError> {
        match value {
            serde_json::Value::Null => Ok(ExecutionContext::default()),
            serde_json::Value::Object(map) if map.is_empty() => Ok(ExecutionContext::default()),
            other => serde_json::from_value(other.clone())
                .map_err(|e| EngineError::CorruptContext(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{DeleteParams, TargetSelector};
    use easel_core::ShapeKind;

    #[test]
    fn legal_transitions() {
        let mut ctx = ExecutionContext::default();
        ctx.advance(TaskPhase::Suspended).unwrap();
        ctx.advance(TaskPhase::Resolved).unwrap();
        ctx.advance(TaskPhase::Committed).unwrap();
        assert_eq!(ctx.phase, TaskPhase::Committed);
    }

    #[test]
    fn committed_is_terminal() {
        let mut ctx = ExecutionContext {
            phase: TaskPhase::Committed,
            ..ExecutionContext::default()
        };
        let err = ctx.advance(TaskPhase::Suspended).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: "committed",
                to: "suspended"
            }
        ));
    }

    #[test]
    fn cannot_commit_without_resolving() {
        let mut ctx = ExecutionContext::default();
        assert!(ctx.advance(TaskPhase::Committed).is_err());
        ctx.advance(TaskPhase::Suspended).unwrap();
        assert!(ctx.advance(TaskPhase::Committed).is_err());
    }

    #[test]
    fn json_round_trip_and_empty_object() {
        let ctx = ExecutionContext {
            intent: Some(Intent::Delete),
            operation_params: Some(IntentRequest::Delete(DeleteParams {
                target: TargetSelector::AllOfKind {
                    kind: ShapeKind::Circle,
                },
            })),
            phase: TaskPhase::Suspended,
            ..ExecutionContext::default()
        };
        let back = ExecutionContext::from_json(&ctx.to_json().unwrap()).unwrap();
        assert_eq!(back, ctx);
        let fresh = ExecutionContext::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(fresh, ExecutionContext::default());
        assert!(ExecutionContext::from_json(&serde_json::json!({"phase": 7})).is_err());
    }
}
