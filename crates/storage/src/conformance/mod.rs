//! Conformance test suite for `SceneStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `SceneStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Shapes**: insert, duplicate detection, update, replace, remove, ordering,
//!   kind/geometry validation
//! - **Log**: append, id monotonicity, entry invariants, undone flag, undo/redo
//!   candidates, batch lookup
//! - **Snapshot isolation**: uncommitted writes invisible, aborted writes discarded
//! - **Threads**: record round-trip and overwrite
//! - **Concurrency**: the snapshot serializes writers
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use easel_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod log;
mod shapes;
mod snapshot;
mod threads;

use std::fmt;
use std::future::Future;

use easel_core::{Color, Geometry, Point3, Shape, ShapeKind};

use crate::record::{ThreadMessage, ThreadRecord, ThreadStatus};
use crate::SceneStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "shapes", "snapshot", "log").
    pub category: String,
    /// Test name (e.g. "insert_then_get_round_trips").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: SceneStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(shapes::run_shape_tests(&factory).await);
    results.extend(log::run_log_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(threads::run_thread_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

/// A unit disc at the origin with the given id, kind and sequence.
///
/// Triangles and squares get a matching vertex list so the shape passes
/// `Shape::validate`.
pub fn make_shape(id: &str, kind: ShapeKind, sequence: u64) -> Shape {
    let geometry = match kind {
        ShapeKind::Circle => Geometry::Disc {
            center: Point3::ORIGIN,
            radius: 1.0,
        },
        ShapeKind::Triangle => Geometry::Polygon {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
        },
        ShapeKind::Square => Geometry::Polygon {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
        },
    };
    Shape {
        id: id.to_string(),
        kind,
        geometry,
        color: Color::default(),
        sequence,
        created_at: "2025-01-01T00:00:00Z".to_string(),
        updated_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_thread(thread_id: &str, status: ThreadStatus) -> ThreadRecord {
    ThreadRecord {
        thread_id: thread_id.to_string(),
        session_id: "session-1".to_string(),
        status,
        resume_token: match status {
            ThreadStatus::Suspended => Some("token-1".to_string()),
            ThreadStatus::Idle => None,
        },
        context: serde_json::json!({"intent": "delete", "resumed": false}),
        history: vec![ThreadMessage {
            role: "user".to_string(),
            content: "delete the nearest circle".to_string(),
        }],
        updated_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

/// Insert `shape` in its own committed snapshot, assigning a fresh sequence.
async fn seed_shape<S: SceneStorage>(
    s: &S,
    id: &str,
    kind: ShapeKind,
) -> Result<Shape, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let seq = s
        .next_shape_sequence(&mut snap)
        .await
        .map_err(|e| format!("sequence: {e}"))?;
    let shape = make_shape(id, kind, seq);
    s.insert_shape(&mut snap, shape.clone())
        .await
        .map_err(|e| format!("insert {id}: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(shape)
}
