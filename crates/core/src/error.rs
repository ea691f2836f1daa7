use crate::shape::ShapeKind;

/// Validation failures raised by the geometry functions.
///
/// Every variant is a user-facing rejection: the request was understood
/// but its parameters cannot produce a valid shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// Side lengths violate the triangle inequality.
    #[error("sides {a}, {b}, {c} cannot form a triangle: each side must be shorter than the sum of the other two")]
    TriangleInequality { a: f64, b: f64, c: f64 },

    /// Explicit vertices describe a triangle with zero area.
    #[error("triangle vertices are collinear")]
    DegenerateTriangle,

    /// A vertex list has the wrong length for the shape kind.
    #[error("a {kind} needs exactly {expected} vertices, got {actual}")]
    VertexCount {
        kind: ShapeKind,
        expected: usize,
        actual: usize,
    },

    /// A length parameter is zero, negative, NaN or infinite.
    #[error("{field} must be a positive finite number, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    /// A coordinate is NaN or infinite.
    #[error("coordinates must be finite numbers")]
    NonFinite,

    /// The specification does not apply to the requested kind.
    #[error("{spec} parameters do not apply to a {kind}")]
    SpecMismatch { kind: ShapeKind, spec: &'static str },

    /// A color string is neither a known name nor a `#rrggbb` value.
    #[error("unrecognized color '{0}'")]
    InvalidColor(String),
}
