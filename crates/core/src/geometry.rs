//! Geometry functions: pure, deterministic mappings from shape parameters
//! to geometry payloads.
//!
//! Polygons generated from lengths lie in the x/z ground plane at the
//! position's height. Explicit vertex lists may lie in any plane.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::shape::{Geometry, Point3, ShapeKind};

/// Length used when a request names a kind but no size.
pub const DEFAULT_SIZE: f64 = 5.0;

/// Relative area tolerance below which explicit triangle vertices are
/// treated as collinear.
const COLLINEAR_EPSILON: f64 = 1e-9;

/// Kind-specific creation parameters.
///
/// Serialized externally tagged, e.g. `{"sides": [3, 4, 5]}` or
/// `{"side_length": 8}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeSpec {
    /// Explicit vertex list (triangle: 3, square: 4).
    Vertices(Vec<Point3>),
    /// Square edge length.
    SideLength(f64),
    /// Circle radius.
    Radius(f64),
    /// Triangle side lengths `[a, b, c]`.
    Sides([f64; 3]),
    /// Equilateral triangle side length.
    Size(f64),
}

impl ShapeSpec {
    /// The spec used when a request names only a kind.
    pub fn default_for(kind: ShapeKind) -> ShapeSpec {
        match kind {
            ShapeKind::Triangle => ShapeSpec::Size(DEFAULT_SIZE),
            ShapeKind::Square => ShapeSpec::SideLength(DEFAULT_SIZE),
            ShapeKind::Circle => ShapeSpec::Radius(DEFAULT_SIZE),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ShapeSpec::Vertices(_) => "vertex",
            ShapeSpec::SideLength(_) => "side length",
            ShapeSpec::Radius(_) => "radius",
            ShapeSpec::Sides(_) => "side lengths",
            ShapeSpec::Size(_) => "size",
        }
    }
}

/// How a resize delta is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resize {
    /// Scale so the characteristic size equals this value.
    To(f64),
    /// Scale by this factor.
    Scale(f64),
}

fn positive(field: &'static str, value: f64) -> Result<f64, GeometryError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(GeometryError::NonPositive { field, value })
    }
}

fn finite_point(p: &Point3) -> Result<(), GeometryError> {
    if p.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonFinite)
    }
}

/// Compute the geometry payload for `kind` from `spec`, placed at `position`.
pub fn compute_geometry(
    kind: ShapeKind,
    spec: &ShapeSpec,
    position: Point3,
) -> Result<Geometry, GeometryError> {
    finite_point(&position)?;
    match (kind, spec) {
        (ShapeKind::Triangle | ShapeKind::Square, ShapeSpec::Vertices(vertices)) => {
            polygon_from_vertices(kind, vertices)
        }
        (ShapeKind::Square, ShapeSpec::SideLength(side)) => {
            let half = positive("side_length", *side)? / 2.0;
            let Point3 { x, y, z } = position;
            Ok(Geometry::Polygon {
                vertices: vec![
                    Point3::new(x - half, y, z - half),
                    Point3::new(x + half, y, z - half),
                    Point3::new(x + half, y, z + half),
                    Point3::new(x - half, y, z + half),
                ],
            })
        }
        (ShapeKind::Circle, ShapeSpec::Radius(radius)) => Ok(Geometry::Disc {
            center: position,
            radius: positive("radius", *radius)?,
        }),
        (ShapeKind::Triangle, ShapeSpec::Sides(sides)) => triangle_from_sides(*sides, position),
        (ShapeKind::Triangle, ShapeSpec::Size(size)) => {
            let s = positive("size", *size)?;
            // Apex toward -z, base toward +z, centroid on `position`.
            let h = s * 3f64.sqrt() / 2.0;
            let Point3 { x, y, z } = position;
            Ok(Geometry::Polygon {
                vertices: vec![
                    Point3::new(x, y, z - 2.0 * h / 3.0),
                    Point3::new(x - s / 2.0, y, z + h / 3.0),
                    Point3::new(x + s / 2.0, y, z + h / 3.0),
                ],
            })
        }
        (kind, spec) => Err(GeometryError::SpecMismatch {
            kind,
            spec: spec.name(),
        }),
    }
}

fn polygon_from_vertices(kind: ShapeKind, vertices: &[Point3]) -> Result<Geometry, GeometryError> {
    let expected = kind.vertex_count().unwrap_or(0);
    if vertices.len() != expected {
        return Err(GeometryError::VertexCount {
            kind,
            expected,
            actual: vertices.len(),
        });
    }
    for v in vertices {
        finite_point(v)?;
    }
    if kind == ShapeKind::Triangle {
        let a = vertices[0].distance(&vertices[1]);
        let b = vertices[1].distance(&vertices[2]);
        let c = vertices[2].distance(&vertices[0]);
        let longest = a.max(b).max(c);
        // Twice the area via the cross product magnitude.
        let (u, w) = (
            Point3::new(
                vertices[1].x - vertices[0].x,
                vertices[1].y - vertices[0].y,
                vertices[1].z - vertices[0].z,
            ),
            Point3::new(
                vertices[2].x - vertices[0].x,
                vertices[2].y - vertices[0].y,
                vertices[2].z - vertices[0].z,
            ),
        );
        let cross = Point3::new(
            u.y * w.z - u.z * w.y,
            u.z * w.x - u.x * w.z,
            u.x * w.y - u.y * w.x,
        );
        let doubled_area = cross.distance(&Point3::ORIGIN);
        if longest == 0.0 || doubled_area <= COLLINEAR_EPSILON * longest * longest {
            return Err(GeometryError::DegenerateTriangle);
        }
    }
    Ok(Geometry::Polygon {
        vertices: vertices.to_vec(),
    })
}

/// Place a triangle with side lengths `[a, b, c]`.
///
/// `v0` sits on the position, `v1` lies `c` along +x, and `v2` is placed by
/// the law of cosines so that `|v0 v2| = b` and `|v1 v2| = a`.
fn triangle_from_sides(sides: [f64; 3], position: Point3) -> Result<Geometry, GeometryError> {
    let [a, b, c] = sides;
    positive("side", a)?;
    positive("side", b)?;
    positive("side", c)?;
    if a >= b + c || b >= a + c || c >= a + b {
        return Err(GeometryError::TriangleInequality { a, b, c });
    }
    let cos_a = (b * b + c * c - a * a) / (2.0 * b * c);
    let sin_a = (1.0 - cos_a * cos_a).max(0.0).sqrt();
    Ok(Geometry::Polygon {
        vertices: vec![
            position,
            position.offset(&Point3::new(c, 0.0, 0.0)),
            position.offset(&Point3::new(b * cos_a, 0.0, b * sin_a)),
        ],
    })
}

/// The length a `Resize::To` targets: first edge for squares, longest side
/// for triangles, radius for circles.
pub fn characteristic_size(kind: ShapeKind, geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::Disc { radius, .. } => *radius,
        Geometry::Polygon { vertices } if vertices.len() < 2 => 0.0,
        Geometry::Polygon { vertices } => match kind {
            ShapeKind::Square => vertices[0].distance(&vertices[1]),
            _ => {
                let n = vertices.len();
                (0..n)
                    .map(|i| vertices[i].distance(&vertices[(i + 1) % n]))
                    .fold(0.0, f64::max)
            }
        },
    }
}

/// Uniformly scale `geometry` about its center.
pub fn resize(kind: ShapeKind, geometry: &Geometry, by: Resize) -> Result<Geometry, GeometryError> {
    let factor = match by {
        Resize::Scale(f) => positive("scale", f)?,
        Resize::To(target) => {
            let target = positive("size", target)?;
            let current = characteristic_size(kind, geometry);
            positive("current size", current)?;
            target / current
        }
    };
    Ok(match geometry {
        Geometry::Polygon { vertices } => {
            let center = Point3::centroid(vertices);
            Geometry::Polygon {
                vertices: vertices
                    .iter()
                    .map(|v| v.scale_about(&center, factor))
                    .collect(),
            }
        }
        Geometry::Disc { center, radius } => Geometry::Disc {
            center: *center,
            radius: radius * factor,
        },
    })
}

/// Move `geometry` by `vector`. Radius is preserved.
pub fn translate(geometry: &Geometry, vector: Point3) -> Result<Geometry, GeometryError> {
    finite_point(&vector)?;
    Ok(match geometry {
        Geometry::Polygon { vertices } => Geometry::Polygon {
            vertices: vertices.iter().map(|v| v.offset(&vector)).collect(),
        },
        Geometry::Disc { center, radius } => Geometry::Disc {
            center: center.offset(&vector),
            radius: *radius,
        },
    })
}
