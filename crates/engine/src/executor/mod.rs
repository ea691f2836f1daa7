//! Task executors: one per mutating or read intent.
//!
//! An executor never writes. It validates parameters, resolves targets
//! (possibly by asking for a suspension), and returns a [`TaskStep`]. The
//! orchestrator turns a [`MutationPlan`] into writes through the journal,
//! inside a single snapshot.

use easel_core::{Color, Geometry, ShapeKind};
use easel_storage::SceneStorage;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{EngineError, FailureKind};
use crate::intent::{Intent, IntentRequest, ResolvedChanges};
use crate::journal::CommitReport;
use crate::orchestrator::EngineConfig;
use crate::suspension::SuspendRequest;

mod create;
mod delete;
mod modify;
mod query;
mod targets;

/// Read access an executor needs.
pub(crate) struct TaskEnv<'a, S> {
    pub storage: &'a S,
    pub config: &'a EngineConfig,
}

/// What the orchestrator should do next.
#[derive(Debug)]
pub enum TaskStep {
    /// Ask the presentation layer and freeze the task.
    Suspend(SuspendRequest),
    /// Apply these mutations atomically.
    Commit(MutationPlan),
    /// Done without writing to the scene.
    Finish(TaskReport),
}

/// A non-mutating end of a task, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub failure: Option<FailureKind>,
    pub message: String,
    pub action: String,
    pub data: Option<Value>,
}

impl TaskReport {
    pub fn completed(action: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        TaskReport {
            failure: None,
            message: message.into(),
            action: action.to_string(),
            data,
        }
    }

    pub fn failed(kind: FailureKind, action: &str, message: impl Into<String>) -> Self {
        TaskReport {
            failure: Some(kind),
            message: message.into(),
            action: action.to_string(),
            data: None,
        }
    }

    /// The request matched more than one thing; ask the user to narrow it.
    pub fn clarify(message: impl Into<String>) -> Self {
        TaskReport::failed(FailureKind::Validation, "clarify", message)
    }
}

/// A new shape before the store assigns its id and sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShape {
    pub kind: ShapeKind,
    pub geometry: Geometry,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert(NewShape),
    /// Changes are applied to the shape's state as read inside the commit.
    Update { id: String, changes: ResolvedChanges },
    Delete { id: String },
}

/// Everything one turn will write. More than one mutation means a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    pub intent: Intent,
    pub mutations: Vec<Mutation>,
}

impl MutationPlan {
    pub fn is_batch(&self) -> bool {
        self.mutations.len() > 1
    }
}

/// Run the executor for the context's stored intent.
pub(crate) async fn execute<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &mut ExecutionContext,
) -> Result<TaskStep, EngineError> {
    let params = ctx
        .operation_params
        .clone()
        .ok_or_else(|| EngineError::CorruptContext("no operation parameters".into()))?;
    match params {
        IntentRequest::Create(p) => create::execute(env, ctx, &p).await,
        IntentRequest::Delete(p) => delete::execute(env, ctx, &p).await,
        IntentRequest::Modify(p) => modify::execute(env, ctx, &p).await,
        IntentRequest::Query(p) => query::execute(env, ctx, &p).await,
        IntentRequest::None { .. } => Err(EngineError::CorruptContext(
            "dispatched a request with no intent".into(),
        )),
    }
}

/// Describe a committed plan for the user.
///
/// A plan where nothing was applied is a failure: not-found if every
/// target had vanished, validation otherwise.
pub(crate) fn summarize(plan: &MutationPlan, report: &CommitReport) -> TaskReport {
    let action = plan.intent.as_str();
    let mut extras = Vec::new();
    if !report.not_found.is_empty() {
        extras.push(format!(
            "{} no longer existed",
            count_noun(report.not_found.len(), "shape")
        ));
    }
    for (id, reason) in &report.rejected {
        extras.push(format!("{id}: {reason}"));
    }

    if report.applied.is_empty() {
        let kind = if report.rejected.is_empty() {
            FailureKind::NotFound
        } else {
            FailureKind::Validation
        };
        let message = format!("Nothing was {}: {}.", past_tense(plan.intent), extras.join("; "));
        return TaskReport::failed(kind, action, message);
    }

    let mut message = match plan.intent {
        Intent::Create => {
            let shape = &report.applied[0];
            format!(
                "Created a {} {} at {} (id {}).",
                shape.color.display_name(),
                shape.kind,
                shape.center(),
                shape.short_id()
            )
        }
        Intent::Modify => {
            let changes = plan.mutations.iter().find_map(|m| match m {
                Mutation::Update { changes, .. } => Some(changes.describe()),
                _ => None,
            });
            format!(
                "Modified {}: {}.",
                describe_shapes(report),
                changes.unwrap_or_default()
            )
        }
        _ => format!("Deleted {}.", describe_shapes(report)),
    };
    if !extras.is_empty() {
        message.push_str(&format!(" ({})", extras.join("; ")));
    }

    let data = serde_json::json!({
        "shapes": report.applied,
        "notFound": report.not_found,
        "batchId": report.batch_id,
    });
    TaskReport::completed(action, message, Some(data))
}

fn past_tense(intent: Intent) -> &'static str {
    match intent {
        Intent::Create => "created",
        Intent::Delete => "deleted",
        _ => "modified",
    }
}

/// "1 circle", "2 triangles", or "3 shapes" for a mix.
fn describe_shapes(report: &CommitReport) -> String {
    let first = report.applied[0].kind;
    let noun = if report.applied.iter().all(|s| s.kind == first) {
        first.as_str()
    } else {
        "shape"
    };
    count_noun(report.applied.len(), noun)
}

pub(crate) fn count_noun(n: usize, noun: &str) -> String {
    format!("{} {}{}", n, noun, if n == 1 { "" } else { "s" })
}
