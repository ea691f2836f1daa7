//! A presentation-layer stand-in that answers suspension requests from the
//! committed scene. Used by the CLI's auto-answer mode and by tests.

use std::sync::Arc;

use easel_core::{Shape, ShapeFilter};
use easel_storage::{SceneStorage, StorageError};

use crate::suspension::{ExternalAnswer, ShapeSummary, SuspendRequest};

pub struct SceneResponder<S> {
    storage: Arc<S>,
}

impl<S: SceneStorage> SceneResponder<S> {
    pub fn new(storage: Arc<S>) -> Self {
        SceneResponder { storage }
    }

    pub async fn answer(&self, request: &SuspendRequest) -> Result<ExternalAnswer, StorageError> {
        let shapes: Vec<ShapeSummary> = match request {
            SuspendRequest::NearbyObjects {
                point,
                radius,
                kind,
            } => {
                let filter = ShapeFilter {
                    kind: *kind,
                    color: None,
                };
                let mut nearby: Vec<(f64, Shape)> = self
                    .storage
                    .list_shapes(&filter)
                    .await?
                    .into_iter()
                    .map(|s| (s.center().distance(point), s))
                    .filter(|(d, _)| *d <= *radius)
                    .collect();
                nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.sequence.cmp(&b.1.sequence)));
                nearby
                    .into_iter()
                    .map(|(d, s)| summary(&s, Some(d)))
                    .collect()
            }
            SuspendRequest::ObjectsByKind { kinds } => self
                .storage
                .list_shapes(&ShapeFilter::default())
                .await?
                .iter()
                .filter(|s| kinds.contains(&s.kind))
                .map(|s| summary(s, None))
                .collect(),
        };
        tracing::debug!(action = request.action(), count = shapes.len(), "answered scene request");
        Ok(ExternalAnswer { shapes })
    }
}

fn summary(shape: &Shape, distance: Option<f64>) -> ShapeSummary {
    ShapeSummary {
        id: shape.id.clone(),
        kind: shape.kind,
        position: shape.center(),
        distance,
        color: Some(shape.color.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Color, Geometry, Point3, ShapeKind};
    use easel_storage::MemoryStorage;

    async fn seed(storage: &MemoryStorage, id: &str, kind: ShapeKind, x: f64, seq: u64) {
        let geometry = match kind {
            ShapeKind::Circle => Geometry::Disc {
                center: Point3::new(x, 0.0, 0.0),
                radius: 1.0,
            },
            _ => Geometry::Polygon {
                vertices: vec![
                    Point3::new(x - 1.0, 0.0, -1.0),
                    Point3::new(x + 1.0, 0.0, -1.0),
                    Point3::new(x, 0.0, 2.0),
                ],
            },
        };
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .insert_shape(
                &mut snap,
                Shape {
                    id: id.into(),
                    kind,
                    geometry,
                    color: Color::default(),
                    sequence: seq,
                    created_at: "t".into(),
                    updated_at: "t".into(),
                },
            )
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();
    }

    #[tokio::test]
    async fn nearby_sorted_and_bounded() {
        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, "far", ShapeKind::Circle, 50.0, 1).await;
        seed(&storage, "b", ShapeKind::Circle, 4.0, 2).await;
        seed(&storage, "a", ShapeKind::Circle, 2.0, 3).await;
        let responder = SceneResponder::new(storage);
        let answer = responder
            .answer(&SuspendRequest::NearbyObjects {
                point: Point3::ORIGIN,
                radius: 10.0,
                kind: None,
            })
            .await
            .unwrap();
        let ids: Vec<&str> = answer.ids().collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(answer.shapes[0].distance, Some(2.0));
    }

    #[tokio::test]
    async fn objects_by_kind_filters() {
        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, "c", ShapeKind::Circle, 0.0, 1).await;
        seed(&storage, "t", ShapeKind::Triangle, 3.0, 2).await;
        let responder = SceneResponder::new(storage);
        let answer = responder
            .answer(&SuspendRequest::ObjectsByKind {
                kinds: vec![ShapeKind::Triangle],
            })
            .await
            .unwrap();
        assert_eq!(answer.ids().collect::<Vec<_>>(), ["t"]);
        assert!(answer.shapes[0].color.is_some());
    }
}
