use easel_core::{Color, SceneSummary, ShapeFilter};
use easel_storage::SceneStorage;

use super::{count_noun, TaskEnv, TaskReport, TaskStep};
use crate::context::{ExecutionContext, TaskPhase};
use crate::error::{EngineError, FailureKind};
use crate::intent::{QueryMode, QueryParams};

pub(super) async fn execute<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &mut ExecutionContext,
    params: &QueryParams,
) -> Result<TaskStep, EngineError> {
    let color = match params.color.as_deref().map(Color::parse).transpose() {
        Ok(c) => c,
        Err(e) => {
            return Ok(TaskStep::Finish(TaskReport::failed(
                FailureKind::Validation,
                "query",
                e.to_string(),
            )))
        }
    };
    let filter = ShapeFilter {
        kind: params.kind,
        color,
    };
    ctx.advance(TaskPhase::Resolved)?;

    let report = match params.mode {
        QueryMode::Count if filter.is_empty() => {
            let summary = SceneSummary::from_counts(env.storage.count_by_kind().await?);
            let message = match summary.total {
                0 => "The scene is empty.".to_string(),
                1 => format!("There is {}.", summary.describe()),
                _ => format!("There are {}.", summary.describe()),
            };
            let data = serde_json::json!({ "count": summary.total, "byKind": summary.by_kind });
            TaskReport::completed("query", message, Some(data))
        }
        QueryMode::Count => {
            let n = env.storage.list_shapes(&filter).await?.len();
            let noun = filter.describe();
            let message = if n == 1 {
                format!("There is 1 {}.", noun.trim_end_matches('s'))
            } else {
                format!("There are {n} {noun}.")
            };
            TaskReport::completed("query", message, Some(serde_json::json!({ "count": n })))
        }
        QueryMode::List => {
            let shapes = env.storage.list_shapes(&filter).await?;
            let message = if shapes.is_empty() {
                format!("There are no {}.", filter.describe())
            } else {
                let lines: Vec<String> = shapes
                    .iter()
                    .map(|s| format!("- {} {} ({})", s.color.display_name(), s.kind, s.short_id()))
                    .collect();
                format!("{}:\n{}", capitalize(&count_noun(shapes.len(), "shape")), lines.join("\n"))
            };
            let data = serde_json::json!({ "count": shapes.len(), "shapes": shapes });
            TaskReport::completed("query", message, Some(data))
        }
    };
    Ok(TaskStep::Finish(report))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
