//! Target resolution for delete and modify.
//!
//! Point- and reference-relative selectors need the presentation layer to
//! say what is on screen. The answer is only a candidate list: every id is
//! re-read from the store and ranked here, by Euclidean distance between
//! centers with ties broken by creation order.

use std::collections::HashSet;

use easel_core::{Color, Point3, Shape, ShapeFilter};
use easel_storage::SceneStorage;

use super::{TaskEnv, TaskReport};
use crate::context::ExecutionContext;
use crate::error::{EngineError, FailureKind};
use crate::intent::TargetSelector;
use crate::suspension::SuspendRequest;

pub(super) enum Resolution {
    Targets(Vec<Shape>),
    Suspend(SuspendRequest),
    Failed(TaskReport),
}

pub(super) async fn resolve<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &ExecutionContext,
    action: &str,
    selector: &TargetSelector,
) -> Result<Resolution, EngineError> {
    let reference_color = match selector {
        TargetSelector::NearestToReference {
            reference_color: Some(c),
            ..
        } => match Color::parse(c) {
            Ok(color) => Some(color),
            Err(e) => {
                return Ok(Resolution::Failed(TaskReport::failed(
                    FailureKind::Validation,
                    action,
                    e.to_string(),
                )))
            }
        },
        _ => None,
    };

    if selector.needs_scene_data() && !ctx.resumed {
        return Ok(Resolution::Suspend(scene_request(env, selector)));
    }

    let shapes = match selector {
        TargetSelector::Id { id } => match env.storage.get_shape(id).await {
            Ok(shape) => vec![shape],
            Err(e) if e.is_not_found() => {
                return Ok(Resolution::Failed(TaskReport::failed(
                    FailureKind::NotFound,
                    action,
                    format!("No shape with id {id}."),
                )))
            }
            Err(e) => return Err(e.into()),
        },
        TargetSelector::AllOfKind { kind } => {
            env.storage.list_shapes(&ShapeFilter::kind(*kind)).await?
        }
        TargetSelector::Kind { kind } => {
            let all = env.storage.list_shapes(&ShapeFilter::kind(*kind)).await?;
            if all.len() > 1 {
                return Ok(Resolution::Failed(TaskReport::clarify(format!(
                    "There are {} {kind}s. Which one do you mean? Try \"the last {kind}\" or \"all {kind}s\".",
                    all.len()
                ))));
            }
            all
        }
        TargetSelector::LastCreated {
            kind,
            offset,
            count,
        } => env.storage.last_created(*kind, *offset, *count).await?,
        TargetSelector::NearestToPoint {
            point,
            radius,
            kind,
            count,
        } => {
            let radius = radius.unwrap_or(env.config.nearby_radius);
            let mut candidates = answered_shapes(env, ctx).await?;
            candidates.retain(|s| {
                kind.map_or(true, |k| s.kind == k) && s.center().distance(point) <= radius
            });
            rank_by_distance(&mut candidates, point);
            candidates.truncate(*count);
            candidates
        }
        TargetSelector::NearestToReference {
            kind,
            reference_kind,
            count,
            ..
        } => {
            let answered = answered_shapes(env, ctx).await?;
            let reference = answered
                .iter()
                .filter(|s| s.kind == *reference_kind)
                .filter(|s| reference_color.as_ref().map_or(true, |c| s.color == *c))
                .max_by_key(|s| s.sequence)
                .cloned();
            let Some(reference) = reference else {
                let noun = match &reference_color {
                    Some(c) => format!("{} {}", c.display_name(), reference_kind),
                    None => reference_kind.to_string(),
                };
                return Ok(Resolution::Failed(TaskReport::failed(
                    FailureKind::Validation,
                    action,
                    format!("There is no {noun} to measure from."),
                )));
            };
            let origin = reference.center();
            let mut candidates: Vec<Shape> = answered
                .into_iter()
                .filter(|s| s.kind == *kind && s.id != reference.id)
                .collect();
            rank_by_distance(&mut candidates, &origin);
            candidates.truncate(*count);
            candidates
        }
    };

    if shapes.is_empty() {
        return Ok(Resolution::Failed(TaskReport::failed(
            FailureKind::Validation,
            action,
            format!("Nothing matched {}.", selector.describe()),
        )));
    }
    Ok(Resolution::Targets(shapes))
}

fn scene_request<S>(env: &TaskEnv<'_, S>, selector: &TargetSelector) -> SuspendRequest {
    match selector {
        TargetSelector::NearestToReference {
            kind,
            reference_kind,
            ..
        } => {
            let mut kinds = vec![*kind];
            if reference_kind != kind {
                kinds.push(*reference_kind);
            }
            SuspendRequest::ObjectsByKind { kinds }
        }
        TargetSelector::NearestToPoint {
            point,
            radius,
            kind,
            ..
        } => SuspendRequest::NearbyObjects {
            point: *point,
            radius: radius.unwrap_or(env.config.nearby_radius),
            kind: *kind,
        },
        // Only scene-data selectors reach here.
        _ => SuspendRequest::ObjectsByKind { kinds: vec![] },
    }
}

/// Current store state of every shape named in the merged answer.
/// Ids the store no longer has are dropped.
pub(super) async fn answered_shapes<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &ExecutionContext,
) -> Result<Vec<Shape>, EngineError> {
    let Some(answer) = &ctx.external_answer else {
        return Ok(Vec::new());
    };
    let mut seen = HashSet::new();
    let mut shapes = Vec::new();
    for id in answer.ids() {
        if !seen.insert(id) {
            continue;
        }
        match env.storage.get_shape(id).await {
            Ok(shape) => shapes.push(shape),
            Err(e) if e.is_not_found() => {
                tracing::debug!(shape_id = id, "answered shape no longer exists");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(shapes)
}

/// Sort by distance from `origin`, then by creation order.
pub(super) fn rank_by_distance(shapes: &mut [Shape], origin: &Point3) {
    shapes.sort_by(|a, b| {
        let da = a.center().distance(origin);
        let db = b.center().distance(origin);
        da.total_cmp(&db).then(a.sequence.cmp(&b.sequence))
    });
}
