//! easel-core: the scene model shared by every Easel crate.
//!
//! Shapes are plain data. A [`Shape`] carries a [`Geometry`] payload whose
//! variant is fixed by its [`ShapeKind`]; the geometry functions in
//! [`geometry`] are pure and deterministic, so task executors can compute a
//! post-mutation snapshot before anything is written.
//!
//! # Public API
//!
//! - [`Shape`], [`ShapeKind`], [`Geometry`], [`Point3`], [`Color`] -- entity model
//! - [`ShapeSpec`] -- kind-specific creation parameters
//! - [`compute_geometry`], [`resize`], [`translate`] -- geometry functions
//! - [`ShapeFilter`], [`SceneSummary`] -- read-side helpers
//! - [`GeometryError`] -- validation failures

pub mod error;
pub mod geometry;
pub mod scene;
pub mod shape;

pub use error::GeometryError;
pub use geometry::{compute_geometry, resize, translate, Resize, ShapeSpec, DEFAULT_SIZE};
pub use scene::{SceneSummary, ShapeFilter};
pub use shape::{Color, Geometry, Point3, Shape, ShapeKind, DEFAULT_COLOR};
