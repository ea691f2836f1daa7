//! Entity model: kinds, points, geometry payloads, colors and shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Color given to shapes created without an explicit color.
pub const DEFAULT_COLOR: &str = "#00ff88";

// ── Point3 ────────────────────────────────────────────────────────────────────

/// A point (or vector) in scene space. `y` is height; `x`/`z` span the ground plane.
///
/// Serializes as `[x, y, z]`; deserializes from either that array form or an
/// `{"x": .., "y": .., "z": ..}` object with missing axes defaulting to 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "PointRepr", into = "[f64; 3]")]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Array([f64; 3]),
    Object {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        z: f64,
    },
}

impl From<PointRepr> for Point3 {
    fn from(repr: PointRepr) -> Self {
        match repr {
            PointRepr::Array([x, y, z]) => Point3 { x, y, z },
            PointRepr::Object { x, y, z } => Point3 { x, y, z },
        }
    }
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(&self, by: &Point3) -> Point3 {
        Point3::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }

    /// Move this point away from (or toward) `center` by `factor`.
    pub fn scale_about(&self, center: &Point3, factor: f64) -> Point3 {
        Point3::new(
            center.x + (self.x - center.x) * factor,
            center.y + (self.y - center.y) * factor,
            center.z + (self.z - center.z) * factor,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Arithmetic mean of a non-empty point set.
    pub fn centroid(points: &[Point3]) -> Point3 {
        if points.is_empty() {
            return Point3::ORIGIN;
        }
        let n = points.len() as f64;
        let (sx, sy, sz) = points.iter().fold((0.0, 0.0, 0.0), |(sx, sy, sz), p| {
            (sx + p.x, sy + p.y, sz + p.z)
        });
        Point3::new(sx / n, sy / n, sz / n)
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ── ShapeKind ─────────────────────────────────────────────────────────────────

/// The closed set of shape kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Triangle,
    #[serde(alias = "quadrilateral", alias = "quad", alias = "rectangle")]
    Square,
    #[serde(alias = "disc", alias = "disk")]
    Circle,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 3] = [ShapeKind::Triangle, ShapeKind::Square, ShapeKind::Circle];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Triangle => "triangle",
            ShapeKind::Square => "square",
            ShapeKind::Circle => "circle",
        }
    }

    /// Number of vertices a polygonal kind carries; `None` for discs.
    pub fn vertex_count(&self) -> Option<usize> {
        match self {
            ShapeKind::Triangle => Some(3),
            ShapeKind::Square => Some(4),
            ShapeKind::Circle => None,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "triangle" | "triangles" => Ok(ShapeKind::Triangle),
            "square" | "squares" | "quadrilateral" | "quadrilaterals" | "quad" | "quads"
            | "rectangle" | "rectangles" => Ok(ShapeKind::Square),
            "circle" | "circles" | "disc" | "discs" | "disk" | "disks" => Ok(ShapeKind::Circle),
            other => Err(format!("unsupported shape kind '{}'", other)),
        }
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Kind-specific geometry payload.
///
/// Triangles and squares carry an ordered vertex list; circles carry a
/// center and radius. Consumers match on the tag exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Polygon { vertices: Vec<Point3> },
    Disc { center: Point3, radius: f64 },
}

impl Geometry {
    /// Center used for distance ranking: vertex centroid or disc center.
    pub fn center(&self) -> Point3 {
        match self {
            Geometry::Polygon { vertices } => Point3::centroid(vertices),
            Geometry::Disc { center, .. } => *center,
        }
    }

    /// Whether this payload has the shape `kind` requires.
    pub fn matches(&self, kind: ShapeKind) -> bool {
        match (self, kind.vertex_count()) {
            (Geometry::Polygon { vertices }, Some(n)) => vertices.len() == n,
            (Geometry::Disc { radius, .. }, None) => *radius > 0.0,
            _ => false,
        }
    }
}

// ── Color ─────────────────────────────────────────────────────────────────────

const NAMED_COLORS: &[(&str, &str)] = &[
    ("red", "#ff0000"),
    ("green", "#00ff00"),
    ("blue", "#0000ff"),
    ("yellow", "#ffff00"),
    ("white", "#ffffff"),
    ("black", "#000000"),
    ("orange", "#ff8800"),
    ("purple", "#8800ff"),
    ("pink", "#ff88ff"),
];

/// A display color, normalized to lowercase `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Parse a color name (`"red"`) or hex value (`"#FF0000"`, `"ff0000"`).
    pub fn parse(input: &str) -> Result<Color, GeometryError> {
        let trimmed = input.trim().to_ascii_lowercase();
        if let Some((_, hex)) = NAMED_COLORS.iter().find(|(name, _)| *name == trimmed) {
            return Ok(Color((*hex).to_string()));
        }
        let digits = trimmed.strip_prefix('#').unwrap_or(&trimmed);
        if digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Color(format!("#{}", digits)));
        }
        Err(GeometryError::InvalidColor(input.to_string()))
    }

    /// Names recognized by [`Color::parse`].
    pub fn known_names() -> impl Iterator<Item = &'static str> {
        NAMED_COLORS.iter().map(|(name, _)| *name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human name for known colors, falling back to the hex value.
    pub fn display_name(&self) -> &str {
        NAMED_COLORS
            .iter()
            .find(|(_, hex)| *hex == self.0)
            .map(|(name, _)| *name)
            .unwrap_or(&self.0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color(DEFAULT_COLOR.to_string())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Shape ─────────────────────────────────────────────────────────────────────

/// A scene entity.
///
/// `sequence` is the store-assigned insertion order. It is part of the
/// snapshot so that a shape restored by undo keeps its original position in
/// "most recently created" orderings and distance tie-breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: String,
    pub kind: ShapeKind,
    pub geometry: Geometry,
    pub color: Color,
    pub sequence: u64,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

impl Shape {
    pub fn center(&self) -> Point3 {
        self.geometry.center()
    }

    /// Check the kind/geometry invariant.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.geometry.matches(self.kind) {
            return Ok(());
        }
        match (&self.geometry, self.kind.vertex_count()) {
            (Geometry::Polygon { vertices }, Some(expected)) => Err(GeometryError::VertexCount {
                kind: self.kind,
                expected,
                actual: vertices.len(),
            }),
            (Geometry::Disc { radius, .. }, None) => Err(GeometryError::NonPositive {
                field: "radius",
                value: *radius,
            }),
            (Geometry::Polygon { .. }, None) => Err(GeometryError::SpecMismatch {
                kind: self.kind,
                spec: "vertex",
            }),
            (Geometry::Disc { .. }, Some(_)) => Err(GeometryError::SpecMismatch {
                kind: self.kind,
                spec: "disc",
            }),
        }
    }

    /// First eight characters of the id, for compact listings.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_accepts_array_and_object_forms() {
        let a: Point3 = serde_json::from_str("[1, 2, 3]").unwrap();
        let b: Point3 = serde_json::from_str(r#"{"x": 1, "y": 2, "z": 3}"#).unwrap();
        let c: Point3 = serde_json::from_str(r#"{"x": 4}"#).unwrap();
        assert_eq!(a, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(a, b);
        assert_eq!(c, Point3::new(4.0, 0.0, 0.0));
        assert_eq!(serde_json::to_value(a).unwrap(), serde_json::json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn kind_aliases_parse() {
        let k: ShapeKind = serde_json::from_str(r#""quadrilateral""#).unwrap();
        assert_eq!(k, ShapeKind::Square);
        let k: ShapeKind = serde_json::from_str(r#""disc""#).unwrap();
        assert_eq!(k, ShapeKind::Circle);
        assert_eq!("Triangles".parse::<ShapeKind>().unwrap(), ShapeKind::Triangle);
        assert!("hexagon".parse::<ShapeKind>().is_err());
    }

    #[test]
    fn color_normalizes_names_and_hex() {
        assert_eq!(Color::parse("Red").unwrap().as_str(), "#ff0000");
        assert_eq!(Color::parse("#00FF88").unwrap().as_str(), "#00ff88");
        assert_eq!(Color::parse("0000ff").unwrap().display_name(), "blue");
        assert!(matches!(
            Color::parse("chartreuse-ish"),
            Err(GeometryError::InvalidColor(_))
        ));
    }

    #[test]
    fn geometry_center_and_kind_match() {
        let tri = Geometry::Polygon {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(3.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 3.0),
            ],
        };
        assert_eq!(tri.center(), Point3::new(1.0, 0.0, 1.0));
        assert!(tri.matches(ShapeKind::Triangle));
        assert!(!tri.matches(ShapeKind::Square));
        assert!(!tri.matches(ShapeKind::Circle));

        let disc = Geometry::Disc {
            center: Point3::new(1.0, 2.0, 3.0),
            radius: 5.0,
        };
        assert!(disc.matches(ShapeKind::Circle));
        assert_eq!(disc.center(), Point3::new(1.0, 2.0, 3.0));
    }
}
