//! The engine facade: `submit`, `resume`, `undo`, `redo`.
//!
//! A turn runs under a per-thread lease held in memory, so a second request
//! for the same thread is refused while the first is in flight. Every write
//! of a turn (shapes, log entries and the thread record) lands in one
//! storage snapshot, and the thread record is re-checked inside that
//! snapshot before anything is written.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use easel_core::{Color, SceneSummary};
use easel_storage::{
    OperationLogEntry, SceneStorage, StorageError, ThreadMessage, ThreadRecord, ThreadStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ExecutionContext, TaskPhase};
use crate::error::{EngineError, FailureKind};
use crate::executor::{self, MutationPlan, TaskEnv, TaskReport, TaskStep};
use crate::intent::Intent;
use crate::journal::{self, ReplayOutcome};
use crate::oracle::IntentOracle;
use crate::router::{RouteDecision, Router};
use crate::suspension::{self, ExternalAnswer, SuspendRequest};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Tunables for placement, target search and history.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Gap along +x between a new shape and the neighbor it is placed beside.
    pub placement_clearance: f64,
    /// Search radius for spatial requests that do not name one.
    pub nearby_radius: f64,
    pub default_color: Color,
    /// Default number of entries returned by [`Orchestrator::history`].
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            placement_clearance: 8.0,
            nearby_radius: 10.0,
            default_color: Color::default(),
            history_limit: 10,
        }
    }
}

// ── Turn outcome ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Suspended,
    Failed,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Completed => "completed",
            TurnStatus::Suspended => "suspended",
            TurnStatus::Failed => "failed",
        }
    }
}

/// What `submit` and `resume` hand back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub thread_id: String,
    pub session_id: String,
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Suspension parameters, present when `status` is `suspended`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
}

impl TurnOutcome {
    fn from_report(record: &ThreadRecord, report: TaskReport) -> Self {
        TurnOutcome {
            thread_id: record.thread_id.clone(),
            session_id: record.session_id.clone(),
            status: if report.failure.is_some() {
                TurnStatus::Failed
            } else {
                TurnStatus::Completed
            },
            failure: report.failure,
            message: report.message,
            action: Some(report.action),
            data: report.data,
            params: None,
            resume_token: None,
        }
    }

    fn suspended(record: &ThreadRecord, request: &SuspendRequest, token: String) -> Self {
        TurnOutcome {
            thread_id: record.thread_id.clone(),
            session_id: record.session_id.clone(),
            status: TurnStatus::Suspended,
            failure: None,
            message: format!("Waiting for {} from the scene.", request.action()),
            action: Some(request.action().to_string()),
            data: None,
            params: Some(request.params()),
            resume_token: Some(token),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.status == TurnStatus::Suspended
    }

    /// The request the caller must answer, rebuilt from `action` and `params`.
    pub fn suspend_request(&self) -> Option<SuspendRequest> {
        if !self.is_suspended() {
            return None;
        }
        serde_json::from_value(serde_json::json!({
            "action": self.action.as_deref()?,
            "params": self.params.clone()?,
        }))
        .ok()
    }
}

// ── Thread lease ──────────────────────────────────────────────────────────────

/// Marks a thread as having a turn in flight; released on drop.
struct Lease<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    thread_id: String,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.thread_id);
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator<S> {
    storage: Arc<S>,
    router: Router,
    config: EngineConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl<S: SceneStorage> Orchestrator<S> {
    pub fn new(storage: Arc<S>, oracle: Arc<dyn IntentOracle>, config: EngineConfig) -> Self {
        Orchestrator {
            storage,
            router: Router::new(oracle),
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new turn on `thread_id`, or on a fresh thread when it is `None`.
    pub async fn submit(
        &self,
        session_id: &str,
        thread_id: Option<&str>,
        text: &str,
    ) -> Result<TurnOutcome, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::MissingSession);
        }
        let thread_id = thread_id
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let _lease = self.lease(&thread_id)?;

        let mut record = match self.storage.get_thread(&thread_id).await {
            Ok(record) => record,
            Err(StorageError::ThreadNotFound { .. }) => ThreadRecord {
                thread_id: thread_id.clone(),
                session_id: session_id.to_string(),
                status: ThreadStatus::Idle,
                resume_token: None,
                context: serde_json::json!({}),
                history: Vec::new(),
                updated_at: timestamp(),
            },
            Err(e) => return Err(e.into()),
        };
        if record.session_id != session_id {
            return Err(EngineError::SessionMismatch { thread_id });
        }
        if record.status == ThreadStatus::Suspended {
            return Err(EngineError::ThreadBusy { thread_id });
        }
        tracing::info!(thread_id = %thread_id, session_id, "turn submitted");

        record.history.push(ThreadMessage {
            role: "user".to_string(),
            content: text.to_string(),
        });
        let summary = SceneSummary::from_counts(self.storage.count_by_kind().await?);
        let mut ctx = ExecutionContext::default();
        let decision = self
            .router
            .route(&mut ctx, &mut record.history, Some((text, &summary)))
            .await?;
        self.drive(record, ctx, decision, None).await
    }

    /// Continue a suspended turn with the presentation layer's answer.
    pub async fn resume(
        &self,
        thread_id: &str,
        token: &str,
        answer: ExternalAnswer,
    ) -> Result<TurnOutcome, EngineError> {
        let _lease = self.lease(thread_id)?;
        let mut record = match self.storage.get_thread(thread_id).await {
            Ok(record) => record,
            Err(StorageError::ThreadNotFound { .. }) => {
                return Err(EngineError::NoPendingSuspension {
                    thread_id: thread_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let mut ctx = suspension::resume(&record, token, answer)?;
        let decision = self.router.route(&mut ctx, &mut record.history, None).await?;
        self.drive(record, ctx, decision, Some(token)).await
    }

    pub async fn undo(&self, session_id: &str) -> Result<ReplayOutcome, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::MissingSession);
        }
        Ok(journal::undo(&*self.storage, session_id).await?)
    }

    pub async fn redo(&self, session_id: &str) -> Result<ReplayOutcome, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::MissingSession);
        }
        Ok(journal::redo(&*self.storage, session_id).await?)
    }

    /// Most recent log entries for `session_id`, newest first.
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<OperationLogEntry>, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::MissingSession);
        }
        let limit = limit.unwrap_or(self.config.history_limit);
        Ok(journal::history(&*self.storage, session_id, limit).await?)
    }

    // -- Turn driving --

    fn lease(&self, thread_id: &str) -> Result<Lease<'_>, EngineError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(thread_id.to_string()) {
            tracing::warn!(thread_id, "rejected request for busy thread");
            return Err(EngineError::ThreadBusy {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(Lease {
            in_flight: &self.in_flight,
            thread_id: thread_id.to_string(),
        })
    }

    async fn drive(
        &self,
        mut record: ThreadRecord,
        mut ctx: ExecutionContext,
        decision: RouteDecision,
        token: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let intent = match decision {
            RouteDecision::Dispatch(intent) => intent,
            RouteDecision::Clarify(message) => {
                let report = TaskReport::completed(Intent::None.as_str(), message, None);
                return self.finish(record, ctx, report, token).await;
            }
            RouteDecision::Reject(message) => {
                let report =
                    TaskReport::failed(FailureKind::Classification, Intent::None.as_str(), message);
                return self.finish(record, ctx, report, token).await;
            }
        };

        let env = TaskEnv {
            storage: &*self.storage,
            config: &self.config,
        };
        match executor::execute(&env, &mut ctx).await? {
            TaskStep::Suspend(request) if ctx.resumed => {
                tracing::warn!(
                    thread_id = %record.thread_id,
                    action = request.action(),
                    "executor asked for a second suspension"
                );
                let report = TaskReport::failed(
                    FailureKind::Validation,
                    intent.as_str(),
                    "The scene answer did not settle the request. Please name the target more precisely.",
                );
                self.finish(record, ctx, report, token).await
            }
            TaskStep::Suspend(request) => {
                let token = suspension::suspend(&mut record, &mut ctx, request.clone(), &timestamp())?;
                let outcome = TurnOutcome::suspended(&record, &request, token);
                record.history.push(ThreadMessage {
                    role: "assistant".to_string(),
                    content: outcome.message.clone(),
                });
                let mut snap = self.storage.begin_snapshot().await?;
                let written = async {
                    guard_thread(&*self.storage, &mut snap, &record.thread_id, None).await?;
                    self.storage.put_thread(&mut snap, record).await?;
                    Ok(outcome)
                }
                .await;
                self.close_snapshot(snap, written).await
            }
            TaskStep::Commit(plan) => self.commit(record, ctx, plan, token).await,
            TaskStep::Finish(report) => self.finish(record, ctx, report, token).await,
        }
    }

    /// Apply `plan` and close the turn in one snapshot.
    async fn commit(
        &self,
        record: ThreadRecord,
        mut ctx: ExecutionContext,
        plan: MutationPlan,
        token: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let now = timestamp();
        let storage = &*self.storage;
        let mut snap = storage.begin_snapshot().await?;
        let written = async {
            guard_thread(storage, &mut snap, &record.thread_id, token).await?;
            let report =
                journal::apply_plan(storage, &mut snap, &record.session_id, &plan, &now).await?;
            if plan.intent == Intent::Create {
                ctx.created_object = report.applied.first().cloned();
            } else {
                ctx.modified_objects = report.applied.clone();
            }
            let summary = executor::summarize(&plan, &report);
            close_turn(storage, &mut snap, record, ctx, summary, &now).await
        }
        .await;
        self.close_snapshot(snap, written).await
    }

    /// Close a turn that wrote no shapes.
    async fn finish(
        &self,
        record: ThreadRecord,
        ctx: ExecutionContext,
        report: TaskReport,
        token: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let now = timestamp();
        let storage = &*self.storage;
        let mut snap = storage.begin_snapshot().await?;
        let written = async {
            guard_thread(storage, &mut snap, &record.thread_id, token).await?;
            close_turn(storage, &mut snap, record, ctx, report, &now).await
        }
        .await;
        self.close_snapshot(snap, written).await
    }

    /// Commit `snap` if `written` succeeded, abort it otherwise.
    async fn close_snapshot(
        &self,
        snap: S::Snapshot,
        written: Result<TurnOutcome, EngineError>,
    ) -> Result<TurnOutcome, EngineError> {
        match written {
            Ok(outcome) => {
                self.storage.commit_snapshot(snap).await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(abort) = self.storage.abort_snapshot(snap).await {
                    tracing::warn!(error = %abort, "failed to abort snapshot");
                }
                Err(e)
            }
        }
    }
}

/// Re-read the thread inside the snapshot. A fresh turn needs it idle (or
/// absent); a resumed turn needs it still suspended under `token`.
async fn guard_thread<S: SceneStorage>(
    storage: &S,
    snap: &mut S::Snapshot,
    thread_id: &str,
    token: Option<&str>,
) -> Result<(), EngineError> {
    match (storage.get_thread_for_update(snap, thread_id).await, token) {
        (Ok(current), Some(token)) => suspension::verify_pending(&current, token),
        (Ok(current), None) if current.status == ThreadStatus::Suspended => {
            Err(EngineError::ThreadBusy {
                thread_id: thread_id.to_string(),
            })
        }
        (Ok(_), None) | (Err(StorageError::ThreadNotFound { .. }), None) => Ok(()),
        (Err(StorageError::ThreadNotFound { .. }), Some(_)) => {
            Err(EngineError::NoPendingSuspension {
                thread_id: thread_id.to_string(),
            })
        }
        (Err(e), _) => Err(e.into()),
    }
}

/// Settle the task phase and write the idle thread record.
async fn close_turn<S: SceneStorage>(
    storage: &S,
    snap: &mut S::Snapshot,
    mut record: ThreadRecord,
    mut ctx: ExecutionContext,
    report: TaskReport,
    now: &str,
) -> Result<TurnOutcome, EngineError> {
    if ctx.intent.is_some() {
        if report.failure.is_some() {
            if ctx.phase != TaskPhase::Failed {
                ctx.advance(TaskPhase::Failed)?;
            }
        } else {
            if ctx.phase != TaskPhase::Resolved {
                ctx.advance(TaskPhase::Resolved)?;
            }
            ctx.advance(TaskPhase::Committed)?;
        }
    }
    ctx.pending = None;
    ctx.external_answer = None;
    ctx.resumed = false;

    let outcome = TurnOutcome::from_report(&record, report);
    record.status = ThreadStatus::Idle;
    record.resume_token = None;
    record.context = ctx.to_json()?;
    record.updated_at = now.to_string();
    record.history.push(ThreadMessage {
        role: "assistant".to_string(),
        content: outcome.message.clone(),
    });
    storage.put_thread(snap, record).await?;
    tracing::info!(
        thread_id = %outcome.thread_id,
        status = outcome.status.as_str(),
        failure = outcome.failure.map(|k| k.as_str()).unwrap_or(""),
        "turn closed"
    );
    Ok(outcome)
}

pub(crate) fn timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::KeywordOracle;
    use easel_storage::MemoryStorage;

    fn orchestrator() -> Orchestrator<MemoryStorage> {
        Orchestrator::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(KeywordOracle::new()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn missing_session_rejected() {
        let orch = orchestrator();
        let err = orch.submit("  ", None, "draw a circle").await.unwrap_err();
        assert!(matches!(err, EngineError::MissingSession));
        assert!(matches!(orch.undo("").await, Err(EngineError::MissingSession)));
    }

    #[tokio::test]
    async fn lease_released_on_drop() {
        let orch = orchestrator();
        {
            let _held = orch.lease("t1").unwrap();
            assert!(matches!(orch.lease("t1"), Err(EngineError::ThreadBusy { .. })));
            assert!(orch.lease("t2").is_ok());
        }
        assert!(orch.lease("t1").is_ok());
    }

    #[tokio::test]
    async fn thread_of_other_session_refused() {
        let orch = orchestrator();
        let first = orch.submit("s1", Some("th"), "how many shapes").await.unwrap();
        assert_eq!(first.status, TurnStatus::Completed);
        let err = orch.submit("s2", Some("th"), "how many shapes").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionMismatch { .. }));
    }

    #[tokio::test]
    async fn completed_turn_leaves_thread_idle_with_history() {
        let orch = orchestrator();
        let outcome = orch.submit("s1", Some("th"), "draw a red circle").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.action.as_deref(), Some("create"));

        let record = orch.storage().get_thread("th").await.unwrap();
        assert_eq!(record.status, ThreadStatus::Idle);
        assert!(record.resume_token.is_none());
        let roles: Vec<&str> = record.history.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "system", "assistant"]);
        let ctx = ExecutionContext::from_json(&record.context).unwrap();
        assert_eq!(ctx.phase, TaskPhase::Committed);
        assert!(ctx.created_object.is_some());
    }

    #[test]
    fn suspend_request_rebuilt_from_outcome() {
        let request = SuspendRequest::ObjectsByKind {
            kinds: vec![easel_core::ShapeKind::Square],
        };
        let record = ThreadRecord {
            thread_id: "th".into(),
            session_id: "s".into(),
            status: ThreadStatus::Suspended,
            resume_token: None,
            context: serde_json::json!({}),
            history: vec![],
            updated_at: "t".into(),
        };
        let outcome = TurnOutcome::suspended(&record, &request, "tok".into());
        assert_eq!(outcome.suspend_request(), Some(request));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["resumeToken"], "tok");
        assert!(json.get("failure").is_none());
    }
}
