use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shape::{Color, Shape, ShapeKind};

/// Kind and/or color filter over the entity set. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ShapeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl ShapeFilter {
    pub fn kind(kind: ShapeKind) -> Self {
        ShapeFilter {
            kind: Some(kind),
            color: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.color.is_none()
    }

    pub fn matches(&self, shape: &Shape) -> bool {
        self.kind.map_or(true, |k| k == shape.kind)
            && self.color.as_ref().map_or(true, |c| *c == shape.color)
    }

    /// Human phrase such as "red circles" or "shapes".
    pub fn describe(&self) -> String {
        let noun = match self.kind {
            Some(k) => format!("{}s", k),
            None => "shapes".to_string(),
        };
        match &self.color {
            Some(c) => format!("{} {}", c.display_name(), noun),
            None => noun,
        }
    }
}

/// Compact view of the scene handed to the intent oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ShapeKind, usize>,
}

impl SceneSummary {
    pub fn from_counts(by_kind: BTreeMap<ShapeKind, usize>) -> Self {
        SceneSummary {
            total: by_kind.values().sum(),
            by_kind,
        }
    }

    pub fn count(&self, kind: ShapeKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// One line, e.g. `3 shapes (1 circle, 2 triangles)`.
    pub fn describe(&self) -> String {
        if self.total == 0 {
            return "the scene is empty".to_string();
        }
        let parts: Vec<String> = self
            .by_kind
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, n)| format!("{} {}{}", n, k, if *n == 1 { "" } else { "s" }))
            .collect();
        format!(
            "{} shape{} ({})",
            self.total,
            if self.total == 1 { "" } else { "s" },
            parts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Geometry, Point3};

    fn shape(kind: ShapeKind, color: &str) -> Shape {
        Shape {
            id: "s".into(),
            kind,
            geometry: Geometry::Disc {
                center: Point3::ORIGIN,
                radius: 1.0,
            },
            color: Color::parse(color).unwrap(),
            sequence: 1,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn filter_matches_kind_and_color() {
        let red_circle = shape(ShapeKind::Circle, "red");
        assert!(ShapeFilter::default().matches(&red_circle));
        assert!(ShapeFilter::kind(ShapeKind::Circle).matches(&red_circle));
        assert!(!ShapeFilter::kind(ShapeKind::Square).matches(&red_circle));
        let blue = ShapeFilter {
            kind: None,
            color: Some(Color::parse("blue").unwrap()),
        };
        assert!(!blue.matches(&red_circle));
        assert_eq!(blue.describe(), "blue shapes");
    }

    #[test]
    fn summary_describes_counts() {
        let mut counts = BTreeMap::new();
        counts.insert(ShapeKind::Triangle, 2);
        counts.insert(ShapeKind::Circle, 1);
        let s = SceneSummary::from_counts(counts);
        assert_eq!(s.total, 3);
        assert_eq!(s.describe(), "3 shapes (2 triangles, 1 circle)");
        assert_eq!(SceneSummary::default().describe(), "the scene is empty");
    }
}
