use easel_storage::SceneStorage;

use super::targets::{resolve, Resolution};
use super::{Mutation, MutationPlan, TaskEnv, TaskStep};
use crate::context::{ExecutionContext, TaskPhase};
use crate::error::EngineError;
use crate::intent::{DeleteParams, Intent};

pub(super) async fn execute<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &mut ExecutionContext,
    params: &DeleteParams,
) -> Result<TaskStep, EngineError> {
    let shapes = match resolve(env, ctx, "delete", &params.target).await? {
        Resolution::Targets(shapes) => shapes,
        Resolution::Suspend(request) => return Ok(TaskStep::Suspend(request)),
        Resolution::Failed(report) => return Ok(TaskStep::Finish(report)),
    };

    ctx.target_object_ids = shapes.iter().map(|s| s.id.clone()).collect();
    ctx.advance(TaskPhase::Resolved)?;
    Ok(TaskStep::Commit(MutationPlan {
        intent: Intent::Delete,
        mutations: shapes
            .into_iter()
            .map(|s| Mutation::Delete { id: s.id })
            .collect(),
    }))
}
