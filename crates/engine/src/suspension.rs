//! Suspension broker: freezes a task that needs presentation-layer data
//! and thaws it when the answer arrives.
//!
//! A suspended thread carries exactly one outstanding request and one
//! resume token. The token is checked twice: once when the answer is
//! merged, and again inside the commit snapshot, so a stale or repeated
//! resume can never mutate the scene.

use easel_core::{Color, Point3, ShapeKind};
use easel_storage::{ThreadRecord, ThreadStatus};
use serde::{Deserialize, Serialize};

use crate::context::{ExecutionContext, TaskPhase};
use crate::error::EngineError;

/// A data request the presentation layer must answer.
///
/// Serialized as `{"action": "...", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum SuspendRequest {
    /// Shapes whose center lies within `radius` of `point`.
    NearbyObjects {
        point: Point3,
        radius: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ShapeKind>,
    },
    /// Every shape of the listed kinds.
    ObjectsByKind { kinds: Vec<ShapeKind> },
}

impl SuspendRequest {
    pub fn action(&self) -> &'static str {
        match self {
            SuspendRequest::NearbyObjects { .. } => "nearby_objects",
            SuspendRequest::ObjectsByKind { .. } => "objects_by_kind",
        }
    }

    /// The `params` half of the wire form.
    pub fn params(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("params").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}

/// One shape as reported by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSummary {
    pub id: String,
    pub kind: ShapeKind,
    pub position: Point3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// The presentation layer's answer to a [`SuspendRequest`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExternalAnswer {
    #[serde(default)]
    pub shapes: Vec<ShapeSummary>,
}

impl ExternalAnswer {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().map(|s| s.id.as_str())
    }
}

/// Freeze `context` into `record` and issue a resume token.
///
/// The caller writes `record` inside a snapshot; nothing is persisted here.
pub fn suspend(
    record: &mut ThreadRecord,
    context: &mut ExecutionContext,
    request: SuspendRequest,
    at: &str,
) -> Result<String, EngineError> {
    context.advance(TaskPhase::Suspended)?;
    context.pending = Some(request);
    context.external_answer = None;
    context.resumed = false;

    let token = uuid::Uuid::new_v4().to_string();
    record.status = ThreadStatus::Suspended;
    record.resume_token = Some(token.clone());
    record.context = context.to_json()?;
    record.updated_at = at.to_string();
    tracing::info!(
        thread_id = %record.thread_id,
        action = context.pending.as_ref().map(SuspendRequest::action).unwrap_or(""),
        "thread suspended"
    );
    Ok(token)
}

/// Check that `record` is suspended under `token`.
pub fn verify_pending(record: &ThreadRecord, token: &str) -> Result<(), EngineError> {
    if record.status != ThreadStatus::Suspended {
        return Err(EngineError::NoPendingSuspension {
            thread_id: record.thread_id.clone(),
        });
    }
    if record.resume_token.as_deref() != Some(token) {
        return Err(EngineError::TokenMismatch {
            thread_id: record.thread_id.clone(),
        });
    }
    Ok(())
}

/// Thaw the frozen context and merge `answer` into it.
///
/// Sets `resumed`, the single signal the router uses to re-enter the
/// stored intent without calling the oracle again.
pub fn resume(
    record: &ThreadRecord,
    token: &str,
    answer: ExternalAnswer,
) -> Result<ExecutionContext, EngineError> {
    verify_pending(record, token)?;
    let mut context = ExecutionContext::from_json(&record.context)?;
    if context.phase != TaskPhase::Suspended || context.pending.is_none() {
        return Err(EngineError::CorruptContext(format!(
            "thread {} is suspended but its context is in phase {}",
            record.thread_id,
            context.phase.as_str()
        )));
    }
    context.pending = None;
    context.external_answer = Some(answer);
    context.resumed = true;
    tracing::info!(thread_id = %record.thread_id, "thread resumed");
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{DeleteParams, Intent, IntentRequest, TargetSelector};

    fn idle_record() -> ThreadRecord {
        ThreadRecord {
            thread_id: "th-1".into(),
            session_id: "s1".into(),
            status: ThreadStatus::Idle,
            resume_token: None,
            context: serde_json::json!({}),
            history: vec![],
            updated_at: "t0".into(),
        }
    }

    fn delete_context() -> ExecutionContext {
        ExecutionContext {
            intent: Some(Intent::Delete),
            operation_params: Some(IntentRequest::Delete(DeleteParams {
                target: TargetSelector::NearestToPoint {
                    point: Point3::ORIGIN,
                    radius: None,
                    kind: None,
                    count: 1,
                },
            })),
            ..ExecutionContext::default()
        }
    }

    fn nearby() -> SuspendRequest {
        SuspendRequest::NearbyObjects {
            point: Point3::ORIGIN,
            radius: 10.0,
            kind: None,
        }
    }

    #[test]
    fn wire_form_is_action_and_params() {
        let json = serde_json::to_value(nearby()).unwrap();
        assert_eq!(json["action"], "nearby_objects");
        assert_eq!(json["params"]["radius"], 10.0);
        assert_eq!(nearby().params()["point"], serde_json::json!([0.0, 0.0, 0.0]));
        let back: SuspendRequest = serde_json::from_value(serde_json::json!({
            "action": "objects_by_kind",
            "params": {"kinds": ["circle", "triangle"]}
        }))
        .unwrap();
        assert_eq!(back.action(), "objects_by_kind");
    }

    #[test]
    fn suspend_then_resume_sets_flag() {
        let mut record = idle_record();
        let mut ctx = delete_context();
        let token = suspend(&mut record, &mut ctx, nearby(), "t1").unwrap();
        assert_eq!(record.status, ThreadStatus::Suspended);
        assert_eq!(record.resume_token.as_deref(), Some(token.as_str()));
        assert!(!ctx.resumed);

        let thawed = resume(&record, &token, ExternalAnswer::default()).unwrap();
        assert!(thawed.resumed);
        assert!(thawed.pending.is_none());
        assert_eq!(thawed.external_answer, Some(ExternalAnswer::default()));
        assert_eq!(thawed.intent, Some(Intent::Delete));
    }

    #[test]
    fn wrong_token_rejected() {
        let mut record = idle_record();
        let mut ctx = delete_context();
        suspend(&mut record, &mut ctx, nearby(), "t1").unwrap();
        let err = resume(&record, "not-the-token", ExternalAnswer::default()).unwrap_err();
        assert!(matches!(err, EngineError::TokenMismatch { .. }));
    }

    #[test]
    fn idle_thread_has_nothing_to_resume() {
        let err = resume(&idle_record(), "anything", ExternalAnswer::default()).unwrap_err();
        assert!(matches!(err, EngineError::NoPendingSuspension { .. }));
    }

    #[test]
    fn each_suspension_gets_a_fresh_token() {
        let mut a = idle_record();
        let mut b = idle_record();
        let t1 = suspend(&mut a, &mut delete_context(), nearby(), "t").unwrap();
        let t2 = suspend(&mut b, &mut delete_context(), nearby(), "t").unwrap();
        assert_ne!(t1, t2);
    }
}
