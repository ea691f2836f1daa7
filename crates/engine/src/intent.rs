//! Intents and their structured parameters, as produced by an
//! [`IntentOracle`](crate::oracle::IntentOracle).
//!
//! The wire shape is the JSON the LLM oracle is asked to emit, e.g.
//! `{"intent": "delete", "target": {"by": "all_of_kind", "kind": "circle"}}`.

use std::fmt;

use easel_core::{resize, translate, Color, GeometryError, Point3, Resize, Shape, ShapeKind, ShapeSpec};
use serde::{Deserialize, Serialize};

/// The closed set of user intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Create,
    Delete,
    Modify,
    Query,
    None,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Create => "create",
            Intent::Delete => "delete",
            Intent::Modify => "modify",
            Intent::Query => "query",
            Intent::None => "none",
        }
    }

    /// Whether executing this intent can mutate the scene.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Intent::Create | Intent::Delete | Intent::Modify)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request: the intent plus its operation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "lowercase")]
pub enum IntentRequest {
    Create(CreateParams),
    Delete(DeleteParams),
    Modify(ModifyParams),
    Query(QueryParams),
    /// Not a scene-editing request. `reply` is an optional clarification.
    None {
        #[serde(default)]
        reply: Option<String>,
    },
}

impl IntentRequest {
    pub fn intent(&self) -> Intent {
        match self {
            IntentRequest::Create(_) => Intent::Create,
            IntentRequest::Delete(_) => Intent::Delete,
            IntentRequest::Modify(_) => Intent::Modify,
            IntentRequest::Query(_) => Intent::Query,
            IntentRequest::None { .. } => Intent::None,
        }
    }
}

// ── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateParams {
    pub kind: ShapeKind,
    /// Size parameters; the kind's default when absent.
    #[serde(default)]
    pub spec: Option<ShapeSpec>,
    /// Requested position; the origin when absent.
    #[serde(default)]
    pub position: Option<Point3>,
    #[serde(default)]
    pub color: Option<String>,
    /// Place next to the nearest existing shape instead of at `position`.
    #[serde(default)]
    pub near: Option<NearSpec>,
}

/// Where to look for a neighbor when placing a new shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NearSpec {
    /// Search origin; the requested position when absent.
    #[serde(default)]
    pub point: Option<Point3>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub kind: Option<ShapeKind>,
}

// ── Delete / Modify targets ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteParams {
    pub target: TargetSelector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyParams {
    pub target: TargetSelector,
    pub changes: ChangeSet,
}

fn one() -> usize {
    1
}

/// How a delete or modify request names its targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum TargetSelector {
    /// A single shape by id.
    Id { id: String },
    /// Every shape of a kind ("all circles").
    AllOfKind { kind: ShapeKind },
    /// The one shape of a kind ("the triangle"). Ambiguous if several exist.
    Kind { kind: ShapeKind },
    /// The `count` most recently created shapes, skipping `offset`.
    LastCreated {
        #[serde(default)]
        kind: Option<ShapeKind>,
        #[serde(default)]
        offset: usize,
        #[serde(default = "one")]
        count: usize,
    },
    /// Shapes nearest to a point. Resolved through the presentation layer.
    NearestToPoint {
        point: Point3,
        #[serde(default)]
        radius: Option<f64>,
        #[serde(default)]
        kind: Option<ShapeKind>,
        #[serde(default = "one")]
        count: usize,
    },
    /// Shapes of `kind` nearest to a reference shape ("the two triangles
    /// nearest the red circle"). Resolved through the presentation layer.
    NearestToReference {
        kind: ShapeKind,
        reference_kind: ShapeKind,
        #[serde(default)]
        reference_color: Option<String>,
        #[serde(default = "one")]
        count: usize,
    },
}

impl TargetSelector {
    /// Whether resolving this selector needs data from the presentation layer.
    pub fn needs_scene_data(&self) -> bool {
        matches!(
            self,
            TargetSelector::NearestToPoint { .. } | TargetSelector::NearestToReference { .. }
        )
    }

    /// Short human description, used in failure messages.
    pub fn describe(&self) -> String {
        match self {
            TargetSelector::Id { id } => format!("shape {id}"),
            TargetSelector::AllOfKind { kind } => format!("{kind}s"),
            TargetSelector::Kind { kind } => format!("the {kind}"),
            TargetSelector::LastCreated { kind, offset, .. } => {
                let noun = kind.map(|k| k.as_str()).unwrap_or("shape");
                if *offset == 0 {
                    format!("the last {noun}")
                } else {
                    format!("the {noun} {offset} before the last")
                }
            }
            TargetSelector::NearestToPoint { point, kind, .. } => {
                let noun = kind.map(|k| k.as_str()).unwrap_or("shape");
                format!("the {noun} nearest to {point}")
            }
            TargetSelector::NearestToReference {
                kind,
                reference_kind,
                reference_color,
                ..
            } => match reference_color {
                Some(c) => format!("the {kind} nearest to the {c} {reference_kind}"),
                None => format!("the {kind} nearest to the {reference_kind}"),
            },
        }
    }
}

// ── Changes ──────────────────────────────────────────────────────────────────

/// Requested property changes for a modify. At least one must be set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// New characteristic size (edge, longest side, or radius).
    #[serde(default)]
    pub size: Option<f64>,
    /// Uniform scale factor. Ignored when `size` is set.
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub translate: Option<Point3>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.scale.is_none() && self.color.is_none() && self.translate.is_none()
    }

    /// Validate the raw values once, before any target is touched.
    pub fn resolve(&self) -> Result<ResolvedChanges, GeometryError> {
        let resize = match (self.size, self.scale) {
            (Some(size), _) => Some(Resize::To(positive("size", size)?)),
            (None, Some(scale)) => Some(Resize::Scale(positive("scale", scale)?)),
            (None, None) => None,
        };
        let color = self.color.as_deref().map(Color::parse).transpose()?;
        if let Some(v) = &self.translate {
            if !v.is_finite() {
                return Err(GeometryError::NonFinite);
            }
        }
        Ok(ResolvedChanges {
            resize,
            color,
            translate: self.translate,
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, GeometryError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(GeometryError::NonPositive { field, value })
    }
}

/// A validated change set, applied to each target's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChanges {
    pub resize: Option<Resize>,
    pub color: Option<Color>,
    pub translate: Option<Point3>,
}

impl ResolvedChanges {
    /// Compute the post-change snapshot of `shape`. Resize happens before
    /// translation so scaling is about the original center.
    pub fn apply(&self, shape: &Shape, at: &str) -> Result<Shape, GeometryError> {
        let mut after = shape.clone();
        if let Some(by) = self.resize {
            after.geometry = resize(shape.kind, &after.geometry, by)?;
        }
        if let Some(vector) = self.translate {
            after.geometry = translate(&after.geometry, vector)?;
        }
        if let Some(color) = &self.color {
            after.color = color.clone();
        }
        after.updated_at = at.to_string();
        Ok(after)
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        match self.resize {
            Some(Resize::To(size)) => parts.push(format!("resized to {size}")),
            Some(Resize::Scale(f)) => parts.push(format!("scaled by {f}")),
            None => {}
        }
        if let Some(c) = &self.color {
            parts.push(format!("recolored {}", c.display_name()));
        }
        if let Some(v) = &self.translate {
            parts.push(format!("moved by {v}"));
        }
        parts.join(", ")
    }
}

// ── Query ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Count,
    List,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub kind: Option<ShapeKind>,
    #[serde(default)]
    pub color: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::Geometry;
    use serde_json::json;

    fn circle(radius: f64) -> Shape {
        Shape {
            id: "c1".into(),
            kind: ShapeKind::Circle,
            geometry: Geometry::Disc {
                center: Point3::new(1.0, 0.0, 1.0),
                radius,
            },
            color: Color::default(),
            sequence: 1,
            created_at: "t0".into(),
            updated_at: "t0".into(),
        }
    }

    #[test]
    fn parses_delete_all_of_kind() {
        let req: IntentRequest = serde_json::from_value(json!({
            "intent": "delete",
            "target": {"by": "all_of_kind", "kind": "circle"}
        }))
        .unwrap();
        assert_eq!(
            req,
            IntentRequest::Delete(DeleteParams {
                target: TargetSelector::AllOfKind {
                    kind: ShapeKind::Circle
                }
            })
        );
    }

    #[test]
    fn parses_create_with_sides_and_defaults() {
        let req: IntentRequest = serde_json::from_value(json!({
            "intent": "create",
            "kind": "triangle",
            "spec": {"sides": [3, 4, 5]}
        }))
        .unwrap();
        let IntentRequest::Create(params) = req else {
            panic!("expected create");
        };
        assert_eq!(params.spec, Some(ShapeSpec::Sides([3.0, 4.0, 5.0])));
        assert!(params.position.is_none());
        assert!(params.near.is_none());
    }

    #[test]
    fn nearest_to_reference_defaults_count_to_one() {
        let sel: TargetSelector = serde_json::from_value(json!({
            "by": "nearest_to_reference",
            "kind": "triangle",
            "reference_kind": "circle",
            "reference_color": "red"
        }))
        .unwrap();
        match sel {
            TargetSelector::NearestToReference { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected {other:?}"),
        }
        let last = TargetSelector::LastCreated {
            kind: None,
            offset: 0,
            count: 1,
        };
        assert!(!last.needs_scene_data());
    }

    #[test]
    fn none_intent_without_reply() {
        let req: IntentRequest = serde_json::from_value(json!({"intent": "none"})).unwrap();
        assert_eq!(req.intent(), Intent::None);
        assert!(!req.intent().is_mutating());
    }

    #[test]
    fn size_takes_precedence_over_scale() {
        let changes = ChangeSet {
            size: Some(10.0),
            scale: Some(3.0),
            ..ChangeSet::default()
        };
        let resolved = changes.resolve().unwrap();
        assert_eq!(resolved.resize, Some(Resize::To(10.0)));
        let after = resolved.apply(&circle(5.0), "t1").unwrap();
        assert_eq!(
            after.geometry,
            Geometry::Disc {
                center: Point3::new(1.0, 0.0, 1.0),
                radius: 10.0
            }
        );
        assert_eq!(after.updated_at, "t1");
        assert_eq!(after.id, "c1");
    }

    #[test]
    fn invalid_changes_rejected_before_apply() {
        let bad_size = ChangeSet {
            size: Some(-1.0),
            ..ChangeSet::default()
        };
        assert!(matches!(
            bad_size.resolve(),
            Err(GeometryError::NonPositive { field: "size", .. })
        ));
        let bad_color = ChangeSet {
            color: Some("mauve-ish".into()),
            ..ChangeSet::default()
        };
        assert!(matches!(
            bad_color.resolve(),
            Err(GeometryError::InvalidColor(_))
        ));
        assert!(ChangeSet::default().is_empty());
    }

    #[test]
    fn resize_then_translate() {
        let changes = ChangeSet {
            scale: Some(2.0),
            translate: Some(Point3::new(0.0, 0.0, 4.0)),
            color: Some("red".into()),
            ..ChangeSet::default()
        };
        let resolved = changes.resolve().unwrap();
        let after = resolved.apply(&circle(2.0), "t1").unwrap();
        assert_eq!(
            after.geometry,
            Geometry::Disc {
                center: Point3::new(1.0, 0.0, 5.0),
                radius: 4.0
            }
        );
        assert_eq!(after.color.as_str(), "#ff0000");
        assert_eq!(resolved.describe(), "scaled by 2, recolored red, moved by (0, 0, 4)");
    }
}
