use easel_core::{compute_geometry, Color, Point3, Shape, ShapeSpec};
use easel_storage::SceneStorage;

use super::targets::{answered_shapes, rank_by_distance};
use super::{Mutation, MutationPlan, NewShape, TaskEnv, TaskReport, TaskStep};
use crate::context::{ExecutionContext, TaskPhase};
use crate::error::{EngineError, FailureKind};
use crate::intent::{CreateParams, Intent, NearSpec};
use crate::suspension::SuspendRequest;

pub(super) async fn execute<S: SceneStorage>(
    env: &TaskEnv<'_, S>,
    ctx: &mut ExecutionContext,
    params: &CreateParams,
) -> Result<TaskStep, EngineError> {
    let color = match params.color.as_deref() {
        Some(raw) => match Color::parse(raw) {
            Ok(c) => c,
            Err(e) => return Ok(reject(e.to_string())),
        },
        None => env.config.default_color.clone(),
    };
    let spec = params
        .spec
        .clone()
        .unwrap_or_else(|| ShapeSpec::default_for(params.kind));
    let requested = params.position.unwrap_or(Point3::ORIGIN);

    // Geometry validity does not depend on position; reject before suspending.
    if let Err(e) = compute_geometry(params.kind, &spec, requested) {
        return Ok(reject(format!("Cannot create that {}: {e}.", params.kind)));
    }

    let position = match &params.near {
        Some(near) if !ctx.resumed => {
            return Ok(TaskStep::Suspend(neighbor_request(env, near, requested)));
        }
        Some(near) => {
            let origin = near.point.unwrap_or(requested);
            let mut neighbors = answered_shapes(env, ctx).await?;
            if let Some(kind) = near.kind {
                neighbors.retain(|s| s.kind == kind);
            }
            rank_by_distance(&mut neighbors, &origin);
            place_beside(neighbors.first(), requested, env.config.placement_clearance)
        }
        None => requested,
    };

    let geometry = match compute_geometry(params.kind, &spec, position) {
        Ok(g) => g,
        Err(e) => return Ok(reject(format!("Cannot create that {}: {e}.", params.kind))),
    };
    ctx.advance(TaskPhase::Resolved)?;
    Ok(TaskStep::Commit(MutationPlan {
        intent: Intent::Create,
        mutations: vec![Mutation::Insert(NewShape {
            kind: params.kind,
            geometry,
            color,
        })],
    }))
}

/// "Next to the circle" asks for every circle; a bare "nearby" asks for
/// whatever is within the search radius.
fn neighbor_request<S>(env: &TaskEnv<'_, S>, near: &NearSpec, requested: Point3) -> SuspendRequest {
    match (near.point, near.kind) {
        (None, Some(kind)) => SuspendRequest::ObjectsByKind { kinds: vec![kind] },
        (point, kind) => SuspendRequest::NearbyObjects {
            point: point.unwrap_or(requested),
            radius: near.radius.unwrap_or(env.config.nearby_radius),
            kind,
        },
    }
}

/// Offset along +x from the nearest neighbor, on the requested plane.
/// With no neighbor the requested position stands.
fn place_beside(nearest: Option<&Shape>, requested: Point3, clearance: f64) -> Point3 {
    match nearest {
        Some(shape) => {
            let c = shape.center();
            Point3::new(c.x + clearance, requested.y, c.z)
        }
        None => requested,
    }
}

fn reject(message: String) -> TaskStep {
    TaskStep::Finish(TaskReport::failed(FailureKind::Validation, "create", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Geometry, ShapeKind};

    fn disc_at(x: f64, z: f64) -> Shape {
        Shape {
            id: "n".into(),
            kind: ShapeKind::Circle,
            geometry: Geometry::Disc {
                center: Point3::new(x, 2.0, z),
                radius: 1.0,
            },
            color: Color::default(),
            sequence: 1,
            created_at: "t".into(),
            updated_at: "t".into(),
        }
    }

    #[test]
    fn placement_offsets_along_x() {
        let p = place_beside(Some(&disc_at(3.0, -4.0)), Point3::new(0.0, 1.0, 0.0), 8.0);
        assert_eq!(p, Point3::new(11.0, 1.0, -4.0));
    }

    #[test]
    fn placement_without_neighbor_keeps_request() {
        let requested = Point3::new(5.0, 0.0, 5.0);
        assert_eq!(place_beside(None, requested, 8.0), requested);
    }
}
