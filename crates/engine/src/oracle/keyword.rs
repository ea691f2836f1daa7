//! Deterministic keyword oracle. Understands a small English command
//! vocabulary so the engine runs without a model:
//!
//! - `draw a red circle with radius 3 at 1 0 2`
//! - `add a square next to the circle`
//! - `delete all circles`, `remove the last triangle`
//! - `delete the two triangles nearest the red circle`
//! - `make the last square size 10`, `color the circle blue`
//! - `move the triangle by 1 0 0`
//! - `how many circles are there`, `list the shapes`

use std::str::FromStr;

use async_trait::async_trait;
use easel_core::{Color, Point3, SceneSummary, ShapeKind, ShapeSpec};

use super::{IntentOracle, OracleError};
use crate::intent::{
    ChangeSet, CreateParams, DeleteParams, IntentRequest, ModifyParams, NearSpec, QueryMode,
    QueryParams, TargetSelector,
};

const CREATE_VERBS: &[&str] = &["draw", "create", "add", "make", "place", "put", "build"];
const DELETE_VERBS: &[&str] = &["delete", "remove", "erase", "clear", "destroy"];
const MODIFY_VERBS: &[&str] = &[
    "resize", "scale", "recolor", "recolour", "color", "colour", "paint", "move", "shift",
    "change", "modify", "set", "enlarge", "grow", "shrink", "turn",
];
const QUERY_VERBS: &[&str] = &["count", "list", "show", "what", "which", "describe"];
const NEAR_WORDS: &[&str] = &["nearest", "closest", "near", "beside", "next"];

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordOracle;

impl KeywordOracle {
    pub fn new() -> Self {
        KeywordOracle
    }

    pub fn parse(&self, text: &str) -> Result<IntentRequest, OracleError> {
        let words = Words::new(text);
        if words.is_empty() {
            return Err(OracleError::Unrecognized(text.to_string()));
        }
        let unrecognized = || OracleError::Unrecognized(text.to_string());

        if words.contains_seq(&["how", "many"]) || words.starts_with_any(QUERY_VERBS) {
            return Ok(IntentRequest::Query(words.query()));
        }
        if words.starts_with_any(DELETE_VERBS) {
            let target = words.target().ok_or_else(unrecognized)?;
            return Ok(IntentRequest::Delete(DeleteParams { target }));
        }
        // "make the square red" edits; "make a square" creates.
        let make_edit = words.first() == Some("make") && words.get(1) == Some("the");
        if make_edit || words.starts_with_any(MODIFY_VERBS) {
            let target = words.target().ok_or_else(unrecognized)?;
            let changes = words.changes();
            if changes.is_empty() {
                return Err(unrecognized());
            }
            return Ok(IntentRequest::Modify(ModifyParams { target, changes }));
        }
        if words.starts_with_any(CREATE_VERBS) {
            return words.create().map(IntentRequest::Create).ok_or_else(unrecognized);
        }
        Ok(IntentRequest::None {
            reply: Some(
                "I can draw, delete, modify or count triangles, squares and circles.".to_string(),
            ),
        })
    }
}

#[async_trait]
impl IntentOracle for KeywordOracle {
    async fn classify(
        &self,
        text: &str,
        _scene: &SceneSummary,
    ) -> Result<IntentRequest, OracleError> {
        self.parse(text)
    }
}

/// Lower-cased, punctuation-split request text.
struct Words(Vec<String>);

impl Words {
    fn new(text: &str) -> Self {
        let cleaned: String = text
            .to_ascii_lowercase()
            .chars()
            .map(|c| match c {
                ',' | '(' | ')' | '[' | ']' | '?' | '!' | ';' | ':' | '=' => ' ',
                c => c,
            })
            .collect();
        Words(
            cleaned
                .split_whitespace()
                .map(|w| {
                    if number(w).is_some() {
                        w.to_string()
                    } else {
                        w.trim_end_matches('.').to_string()
                    }
                })
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get(&self, i: usize) -> Option<&str> {
        self.0.get(i).map(String::as_str)
    }

    fn first(&self) -> Option<&str> {
        self.get(0)
    }

    fn position(&self, any: &[&str]) -> Option<usize> {
        self.0.iter().position(|w| any.contains(&w.as_str()))
    }

    fn has(&self, any: &[&str]) -> bool {
        self.position(any).is_some()
    }

    fn starts_with_any(&self, verbs: &[&str]) -> bool {
        self.first().is_some_and(|w| verbs.contains(&w))
    }

    fn contains_seq(&self, seq: &[&str]) -> bool {
        self.0
            .windows(seq.len())
            .any(|w| w.iter().zip(seq).all(|(a, b)| a == b))
    }

    /// Every shape-kind word with its index.
    fn kinds(&self) -> Vec<(usize, ShapeKind)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, w)| ShapeKind::from_str(w).ok().map(|k| (i, k)))
            .collect()
    }

    /// Every color word (name or hex) with its index.
    fn colors(&self) -> Vec<(usize, String)> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                Color::known_names().any(|n| n == w.as_str())
                    || (w.starts_with('#') && Color::parse(w).is_ok())
            })
            .map(|(i, w)| (i, w.clone()))
            .collect()
    }

    /// The first number after any of `keys`.
    fn number_after(&self, keys: &[&str]) -> Option<f64> {
        let start = self.position(keys)?;
        self.0[start + 1..].iter().find_map(|w| number(w))
    }

    /// Up to three consecutive numbers after any of `keys`. Two numbers
    /// are read as a point on the ground plane.
    fn point_after(&self, keys: &[&str]) -> Option<Point3> {
        let start = self.position(keys)?;
        let nums: Vec<f64> = self.0[start + 1..]
            .iter()
            .skip_while(|w| number(w).is_none() && !is_axis(w))
            .filter(|w| !is_axis(w))
            .map_while(|w| number(w))
            .take(3)
            .collect();
        match nums.as_slice() {
            [x, y, z] => Some(Point3::new(*x, *y, *z)),
            [x, z] => Some(Point3::new(*x, 0.0, *z)),
            _ => None,
        }
    }

    /// A count word ("two", "3") before the first kind word.
    fn count(&self) -> Option<usize> {
        let end = self.kinds().first().map(|(i, _)| *i).unwrap_or(self.0.len());
        self.0[..end].iter().find_map(|w| count_word(w))
    }

    // ── Intent-specific extraction ──────────────────────────────────────────

    fn query(&self) -> QueryParams {
        let mode = if self.starts_with_any(&["list", "show", "which", "describe"])
            || self.contains_seq(&["what", "is"])
            || self.contains_seq(&["what", "are"])
            || self.contains_seq(&["what's"])
        {
            QueryMode::List
        } else {
            QueryMode::Count
        };
        QueryParams {
            mode,
            kind: self.kinds().first().map(|(_, k)| *k),
            color: self.colors().first().map(|(_, c)| c.clone()),
        }
    }

    fn target(&self) -> Option<TargetSelector> {
        if let Some(i) = self.position(&["id"]) {
            return self.get(i + 1).map(|id| TargetSelector::Id { id: id.to_string() });
        }
        let kinds = self.kinds();
        let first_kind = kinds.first().map(|(_, k)| *k);
        let count = self.count().unwrap_or(1);

        if let Some(near_at) = self.position(NEAR_WORDS) {
            if let Some(point) = self.point_after(NEAR_WORDS) {
                return Some(TargetSelector::NearestToPoint {
                    point,
                    radius: self.number_after(&["within"]),
                    kind: first_kind,
                    count,
                });
            }
            let reference = kinds.iter().find(|(i, _)| *i > near_at);
            if let (Some(kind), Some((ref_at, reference_kind))) = (first_kind, reference) {
                let reference_color = self
                    .colors()
                    .into_iter()
                    .find(|(i, _)| *i > near_at && *i < *ref_at)
                    .map(|(_, c)| c);
                return Some(TargetSelector::NearestToReference {
                    kind,
                    reference_kind: *reference_kind,
                    reference_color,
                    count,
                });
            }
        }
        if self.has(&["all", "every", "each"]) {
            return first_kind.map(|kind| TargetSelector::AllOfKind { kind });
        }
        if self.has(&["last", "latest", "newest", "previous", "recent"]) {
            let offset = if self.contains_seq(&["before", "last"])
                || self.contains_seq(&["second", "last"])
                || self.contains_seq(&["second", "to", "last"])
            {
                1
            } else {
                0
            };
            return Some(TargetSelector::LastCreated {
                kind: first_kind,
                offset,
                count,
            });
        }
        if self.has(&["it", "that", "this"]) && first_kind.is_none() {
            return Some(TargetSelector::LastCreated {
                kind: None,
                offset: 0,
                count: 1,
            });
        }
        first_kind.map(|kind| TargetSelector::Kind { kind })
    }

    fn changes(&self) -> ChangeSet {
        let last_kind_at = self.kinds().last().map(|(i, _)| *i).unwrap_or(0);
        let color = self
            .colors()
            .into_iter()
            .find(|(i, _)| *i > last_kind_at)
            .map(|(_, c)| c);
        let size = self.number_after(&["size", "radius", "side", "length", "to"]);
        let scale = if self.has(&["bigger", "larger", "enlarge", "grow"]) {
            Some(self.number_after(&["by", "times"]).unwrap_or(2.0))
        } else if self.has(&["smaller", "shrink"]) {
            Some(1.0 / self.number_after(&["by", "times"]).unwrap_or(2.0))
        } else if self.starts_with_any(&["scale"]) {
            self.number_after(&["by"])
        } else {
            None
        };
        let translate = if self.starts_with_any(&["move", "shift"]) {
            self.point_after(&["by"])
        } else {
            None
        };
        ChangeSet {
            // "move ... to" is not a resize.
            size: if translate.is_some() || scale.is_some() { None } else { size },
            scale,
            color,
            translate,
        }
    }

    fn create(&self) -> Option<CreateParams> {
        let kinds = self.kinds();
        let (kind_at, kind) = *kinds.first()?;
        let spec = self.spec(kind);
        let position = self.point_after(&["at"]);
        let near = self.position(NEAR_WORDS).map(|near_at| NearSpec {
            point: self.point_after(NEAR_WORDS),
            radius: self.number_after(&["within"]),
            kind: kinds.iter().find(|(i, _)| *i > near_at).map(|(_, k)| *k),
        });
        let color = self
            .colors()
            .into_iter()
            .find(|(i, _)| near.is_none() || *i <= kind_at + 1)
            .map(|(_, c)| c);
        Some(CreateParams {
            kind,
            spec,
            position,
            color,
            near,
        })
    }

    fn spec(&self, kind: ShapeKind) -> Option<ShapeSpec> {
        if kind == ShapeKind::Triangle {
            if let Some(start) = self.position(&["sides"]) {
                let nums: Vec<f64> = self.0[start + 1..]
                    .iter()
                    .filter(|w| w.as_str() != "and")
                    .map_while(|w| number(w))
                    .take(3)
                    .collect();
                if let [a, b, c] = nums.as_slice() {
                    return Some(ShapeSpec::Sides([*a, *b, *c]));
                }
            }
        }
        let size = self.number_after(&["radius", "side", "sides", "size", "length", "edge"])?;
        Some(match kind {
            ShapeKind::Circle => ShapeSpec::Radius(size),
            ShapeKind::Square => ShapeSpec::SideLength(size),
            ShapeKind::Triangle => ShapeSpec::Size(size),
        })
    }
}

fn number(w: &str) -> Option<f64> {
    w.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_axis(w: &str) -> bool {
    matches!(w, "x" | "y" | "z")
}

fn count_word(w: &str) -> Option<usize> {
    match w {
        "one" | "a" | "an" => Some(1),
        "two" | "both" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        _ => w.parse::<usize>().ok().filter(|n| *n > 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;

    fn parse(text: &str) -> IntentRequest {
        KeywordOracle::new().parse(text).unwrap()
    }

    #[test]
    fn create_circle_with_radius_and_position() {
        let IntentRequest::Create(p) = parse("Draw a red circle with radius 3 at (1, 0, 2)") else {
            panic!("expected create");
        };
        assert_eq!(p.kind, ShapeKind::Circle);
        assert_eq!(p.spec, Some(ShapeSpec::Radius(3.0)));
        assert_eq!(p.position, Some(Point3::new(1.0, 0.0, 2.0)));
        assert_eq!(p.color.as_deref(), Some("red"));
        assert!(p.near.is_none());
    }

    #[test]
    fn create_triangle_from_sides() {
        let IntentRequest::Create(p) = parse("create a triangle with sides 3, 4 and 5") else {
            panic!("expected create");
        };
        assert_eq!(p.spec, Some(ShapeSpec::Sides([3.0, 4.0, 5.0])));
    }

    #[test]
    fn create_next_to_existing_kind() {
        let IntentRequest::Create(p) = parse("add a square next to the circle") else {
            panic!("expected create");
        };
        assert_eq!(p.kind, ShapeKind::Square);
        let near = p.near.expect("near spec");
        assert_eq!(near.kind, Some(ShapeKind::Circle));
        assert!(near.point.is_none());
    }

    #[test]
    fn delete_all_of_kind() {
        assert_eq!(
            parse("delete all circles"),
            IntentRequest::Delete(DeleteParams {
                target: TargetSelector::AllOfKind {
                    kind: ShapeKind::Circle
                }
            })
        );
    }

    #[test]
    fn delete_nearest_to_reference() {
        let IntentRequest::Delete(p) = parse("delete the two triangles nearest the red circle")
        else {
            panic!("expected delete");
        };
        assert_eq!(
            p.target,
            TargetSelector::NearestToReference {
                kind: ShapeKind::Triangle,
                reference_kind: ShapeKind::Circle,
                reference_color: Some("red".into()),
                count: 2,
            }
        );
    }

    #[test]
    fn delete_nearest_to_point() {
        let IntentRequest::Delete(p) = parse("remove the circle closest to 0 0 0") else {
            panic!("expected delete");
        };
        assert!(matches!(
            p.target,
            TargetSelector::NearestToPoint {
                kind: Some(ShapeKind::Circle),
                count: 1,
                ..
            }
        ));
    }

    #[test]
    fn modify_last_square_size() {
        let IntentRequest::Modify(p) = parse("make the last square size 10") else {
            panic!("expected modify");
        };
        assert_eq!(
            p.target,
            TargetSelector::LastCreated {
                kind: Some(ShapeKind::Square),
                offset: 0,
                count: 1
            }
        );
        assert_eq!(p.changes.size, Some(10.0));
        assert!(p.changes.color.is_none());
    }

    #[test]
    fn modify_color_and_move() {
        let IntentRequest::Modify(p) = parse("color the circle blue") else {
            panic!("expected modify");
        };
        assert_eq!(p.target, TargetSelector::Kind { kind: ShapeKind::Circle });
        assert_eq!(p.changes.color.as_deref(), Some("blue"));

        let IntentRequest::Modify(p) = parse("move the last triangle by 1 0 2") else {
            panic!("expected modify");
        };
        assert_eq!(p.changes.translate, Some(Point3::new(1.0, 0.0, 2.0)));
        assert!(p.changes.size.is_none());
    }

    #[test]
    fn queries() {
        let IntentRequest::Query(q) = parse("How many circles are there?") else {
            panic!("expected query");
        };
        assert_eq!(q.mode, QueryMode::Count);
        assert_eq!(q.kind, Some(ShapeKind::Circle));
        let IntentRequest::Query(q) = parse("list the shapes") else {
            panic!("expected query");
        };
        assert_eq!(q.mode, QueryMode::List);
        assert_eq!(q.kind, None);
    }

    #[test]
    fn greeting_is_none_and_gibberish_fails() {
        assert_eq!(parse("hello there").intent(), Intent::None);
        assert!(matches!(
            KeywordOracle::new().parse("delete"),
            Err(OracleError::Unrecognized(_))
        ));
        assert!(KeywordOracle::new().parse("   ").is_err());
    }
}
