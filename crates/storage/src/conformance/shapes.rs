//! Shape table conformance tests.

use std::future::Future;

use easel_core::{Color, Geometry, Point3, ShapeFilter, ShapeKind};

use super::{make_shape, seed_shape, TestResult};
use crate::{SceneStorage, ShapeDelta, StorageError};

pub(super) async fn run_shape_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "shapes",
            "insert_then_get_round_trips",
            insert_then_get_round_trips(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "duplicate_insert_rejected",
            duplicate_insert_rejected(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "get_missing_shape_not_found",
            get_missing_shape_not_found(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "update_applies_delta",
            update_applies_delta(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "replace_and_remove_missing_not_found",
            replace_and_remove_missing_not_found(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "remove_returns_last_state",
            remove_returns_last_state(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "sequences_strictly_increase",
            sequences_strictly_increase(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "list_newest_first_with_filter",
            list_newest_first_with_filter(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "last_created_honors_offset_and_count",
            last_created_honors_offset_and_count(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "count_by_kind_omits_empty_kinds",
            count_by_kind_omits_empty_kinds(factory).await,
        ),
        TestResult::from_result(
            "shapes",
            "geometry_must_fit_kind",
            geometry_must_fit_kind(factory).await,
        ),
    ]
}

async fn insert_then_get_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let inserted = seed_shape(&s, "tri-1", ShapeKind::Triangle).await?;
    let read = s.get_shape("tri-1").await.map_err(|e| e.to_string())?;
    if read != inserted {
        return Err(format!("expected {inserted:?}, got {read:?}"));
    }
    Ok(())
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_shape(&s, "dup", ShapeKind::Circle).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.insert_shape(&mut snap, make_shape("dup", ShapeKind::Square, 99)).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::AlreadyExists { id }) if id == "dup" => {}
        other => return Err(format!("expected AlreadyExists, got {other:?}")),
    }
    let kept = s.get_shape("dup").await.map_err(|e| e.to_string())?;
    if kept.kind != ShapeKind::Circle {
        return Err(format!("duplicate insert overwrote shape: {kept:?}"));
    }
    Ok(())
}

async fn get_missing_shape_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_shape("ghost").await {
        Err(StorageError::ShapeNotFound { id }) if id == "ghost" => {}
        other => return Err(format!("expected ShapeNotFound, got {other:?}")),
    }
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_shape_for_update(&mut snap, "ghost").await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::ShapeNotFound { .. }) => Ok(()),
        other => Err(format!("expected ShapeNotFound for update read, got {other:?}")),
    }
}

async fn update_applies_delta<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let original = seed_shape(&s, "c1", ShapeKind::Circle).await?;
    let red = Color::parse("red").map_err(|e| e.to_string())?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let updated = s
        .update_shape(
            &mut snap,
            "c1",
            ShapeDelta {
                geometry: None,
                color: Some(red.clone()),
                updated_at: "2025-02-01T00:00:00Z".to_string(),
            },
        )
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if updated.color != red || updated.geometry != original.geometry {
        return Err(format!("delta applied incorrectly: {updated:?}"));
    }
    let read = s.get_shape("c1").await.map_err(|e| e.to_string())?;
    if read != updated {
        return Err(format!("stored {read:?} differs from returned {updated:?}"));
    }
    if read.created_at != original.created_at || read.updated_at == original.updated_at {
        return Err("timestamps not maintained by update".to_string());
    }
    Ok(())
}

async fn replace_and_remove_missing_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let replaced = s
        .replace_shape(&mut snap, make_shape("ghost", ShapeKind::Circle, 1))
        .await;
    let removed = s.remove_shape(&mut snap, "ghost").await;
    let updated = s
        .update_shape(&mut snap, "ghost", ShapeDelta::default())
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if !matches!(replaced, Err(StorageError::ShapeNotFound { .. })) {
        return Err(format!("replace: expected ShapeNotFound, got {replaced:?}"));
    }
    if !matches!(removed, Err(StorageError::ShapeNotFound { .. })) {
        return Err(format!("remove: expected ShapeNotFound, got {removed:?}"));
    }
    if !matches!(updated, Err(StorageError::ShapeNotFound { .. })) {
        return Err(format!("update: expected ShapeNotFound, got {updated:?}"));
    }
    Ok(())
}

async fn remove_returns_last_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut shape = seed_shape(&s, "sq", ShapeKind::Square).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    shape.geometry = Geometry::Polygon {
        vertices: vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 2.0),
            Point3::new(0.0, 0.0, 2.0),
        ],
    };
    s.replace_shape(&mut snap, shape.clone())
        .await
        .map_err(|e| e.to_string())?;
    let removed = s
        .remove_shape(&mut snap, "sq")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    if removed != shape {
        return Err(format!("remove returned {removed:?}, expected {shape:?}"));
    }
    match s.get_shape("sq").await {
        Err(StorageError::ShapeNotFound { .. }) => Ok(()),
        other => Err(format!("shape still present after remove: {other:?}")),
    }
}

async fn sequences_strictly_increase<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_shape(&s, "a", ShapeKind::Circle).await?;
    let b = seed_shape(&s, "b", ShapeKind::Circle).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let c = s
        .next_shape_sequence(&mut snap)
        .await
        .map_err(|e| e.to_string())?;
    let d = s
        .next_shape_sequence(&mut snap)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if !(a.sequence < b.sequence && b.sequence < c && c < d) {
        return Err(format!(
            "sequences not increasing: {}, {}, {c}, {d}",
            a.sequence, b.sequence
        ));
    }
    Ok(())
}

async fn list_newest_first_with_filter<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_shape(&s, "t1", ShapeKind::Triangle).await?;
    seed_shape(&s, "c1", ShapeKind::Circle).await?;
    seed_shape(&s, "t2", ShapeKind::Triangle).await?;

    let all: Vec<String> = s
        .list_shapes(&ShapeFilter::default())
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|sh| sh.id)
        .collect();
    if all != ["t2", "c1", "t1"] {
        return Err(format!("expected newest-first [t2, c1, t1], got {all:?}"));
    }

    let triangles: Vec<String> = s
        .list_shapes(&ShapeFilter::kind(ShapeKind::Triangle))
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|sh| sh.id)
        .collect();
    if triangles != ["t2", "t1"] {
        return Err(format!("expected [t2, t1], got {triangles:?}"));
    }

    let red = ShapeFilter {
        kind: None,
        color: Some(Color::parse("red").map_err(|e| e.to_string())?),
    };
    let none = s.list_shapes(&red).await.map_err(|e| e.to_string())?;
    if !none.is_empty() {
        return Err(format!("color filter matched {} shapes", none.len()));
    }
    Ok(())
}

async fn last_created_honors_offset_and_count<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for id in ["t1", "t2", "t3"] {
        seed_shape(&s, id, ShapeKind::Triangle).await?;
    }
    seed_shape(&s, "c1", ShapeKind::Circle).await?;

    let ids = |v: Vec<easel_core::Shape>| v.into_iter().map(|sh| sh.id).collect::<Vec<_>>();

    let last_two = s
        .last_created(Some(ShapeKind::Triangle), 0, 2)
        .await
        .map_err(|e| e.to_string())?;
    if ids(last_two.clone()) != ["t3", "t2"] {
        return Err(format!("expected [t3, t2], got {:?}", ids(last_two)));
    }
    let second = s
        .last_created(Some(ShapeKind::Triangle), 1, 1)
        .await
        .map_err(|e| e.to_string())?;
    if ids(second.clone()) != ["t2"] {
        return Err(format!("expected [t2], got {:?}", ids(second)));
    }
    let any = s.last_created(None, 0, 1).await.map_err(|e| e.to_string())?;
    if ids(any.clone()) != ["c1"] {
        return Err(format!("expected [c1], got {:?}", ids(any)));
    }
    let past_end = s
        .last_created(Some(ShapeKind::Triangle), 5, 2)
        .await
        .map_err(|e| e.to_string())?;
    if !past_end.is_empty() {
        return Err("offset past end should be empty".to_string());
    }
    Ok(())
}

async fn count_by_kind_omits_empty_kinds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_shape(&s, "t1", ShapeKind::Triangle).await?;
    seed_shape(&s, "t2", ShapeKind::Triangle).await?;
    seed_shape(&s, "c1", ShapeKind::Circle).await?;
    let counts = s.count_by_kind().await.map_err(|e| e.to_string())?;
    if counts.get(&ShapeKind::Triangle) != Some(&2)
        || counts.get(&ShapeKind::Circle) != Some(&1)
        || counts.contains_key(&ShapeKind::Square)
    {
        return Err(format!("unexpected counts {counts:?}"));
    }
    Ok(())
}

async fn geometry_must_fit_kind<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_shape(&s, "t1", ShapeKind::Triangle).await?;

    let mut disc_triangle = make_shape("t2", ShapeKind::Triangle, 50);
    disc_triangle.geometry = Geometry::Disc {
        center: Point3::ORIGIN,
        radius: 2.0,
    };
    let mut two_vertex_square = make_shape("t1", ShapeKind::Square, 51);
    two_vertex_square.geometry = Geometry::Polygon {
        vertices: vec![Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0)],
    };
    let mut misshapen = make_shape("t1", ShapeKind::Triangle, 52);
    misshapen.geometry = disc_triangle.geometry.clone();

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let inserted = s.insert_shape(&mut snap, disc_triangle).await;
    let replaced = s.replace_shape(&mut snap, misshapen).await;
    let retyped = s.replace_shape(&mut snap, two_vertex_square).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    for (label, result) in [("insert", inserted), ("replace", replaced), ("retype", retyped)] {
        if !matches!(result, Err(StorageError::InvalidShape { .. })) {
            return Err(format!("{label}: expected InvalidShape, got {result:?}"));
        }
    }
    match s.get_shape("t2").await {
        Err(StorageError::ShapeNotFound { .. }) => {}
        other => return Err(format!("invalid shape was stored: {other:?}")),
    }
    let kept = s.get_shape("t1").await.map_err(|e| e.to_string())?;
    if !matches!(kept.geometry, Geometry::Polygon { .. }) {
        return Err(format!("replace overwrote valid shape: {kept:?}"));
    }
    Ok(())
}
