use easel_storage::SceneStorage;

use super::targets::{resolve, Resolution};
use super::{Mutation, MutationPlan, TaskEnv, TaskReport, TaskStep};
use crate::context::{ExecutionContext, TaskPhase};
use crate::error::{EngineError, FailureKind};
use crate::intent::{Intent, ModifyParams};

pub(super) async fn execute<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &mut ExecutionContext,
    params: &ModifyParams,
) -> Result<TaskStep, EngineError> {
    if params.changes.is_empty() {
        return Ok(TaskStep::Finish(TaskReport::failed(
            FailureKind::Validation,
            "modify",
            "Please say what to change: size, scale, color or position.",
        )));
    }
    let changes = match params.changes.resolve() {
        Ok(c) => c,
        Err(e) => {
            return Ok(TaskStep::Finish(TaskReport::failed(
                FailureKind::Validation,
                "modify",
                e.to_string(),
            )))
        }
    };

    let shapes = match resolve(env, ctx, "modify", &params.target).await? {
        Resolution::Targets(shapes) => shapes,
        Resolution::Suspend(request) => return Ok(TaskStep::Suspend(request)),
        Resolution::Failed(report) => return Ok(TaskStep::Finish(report)),
    };

    ctx.target_object_ids = shapes.iter().map(|s| s.id.clone()).collect();
    ctx.advance(TaskPhase::Resolved)?;
    Ok(TaskStep::Commit(MutationPlan {
        intent: Intent::Modify,
        mutations: shapes
            .into_iter()
            .map(|s| Mutation::Update {
                id: s.id,
                changes: changes.clone(),
            })
            .collect(),
    }))
}
