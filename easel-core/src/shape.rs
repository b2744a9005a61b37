//! Immutable shape values.
//!
//! A [`Shape`] never changes in place: an update produces a new value
//! under the same [`ShapeId`] which replaces the old one in the store.
//! Geometry is a closed sum type so every kind-dependent computation is
//! matched exhaustively.
//!
//! Wire shape (one JSON object, geometry flattened in):
//! ```text
//! { "id": "rect-<origin>-3", "type": "Rectangle",
//!   "from": {"x":0,"y":0}, "to": {"x":10,"y":10},
//!   "borderColor": "#000000", "fillColor": "transparent", "temporary": false }
//! ```

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Point;

/// Maximum distance (canvas units) at which a point still hits a segment.
pub const SEGMENT_HIT_TOLERANCE: f32 = 3.0;

/// Globally unique, immutable shape identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a locally generated id: `<kind-prefix>-<origin>-<counter>`.
    pub fn generate(kind: ShapeKind, origin: &str, counter: u64) -> Self {
        Self(format!("{}-{origin}-{counter}", kind.prefix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ShapeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShapeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ShapeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The four drawable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Segment,
    Circle,
    Rectangle,
    Triangle,
}

impl ShapeKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ShapeKind::Segment => "line",
            ShapeKind::Circle => "circle",
            ShapeKind::Rectangle => "rect",
            ShapeKind::Triangle => "triangle",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Segment => "segment",
            ShapeKind::Circle => "circle",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Triangle => "triangle",
        };
        f.write_str(name)
    }
}

/// Kind-specific geometric payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    #[serde(rename = "Line", alias = "Segment")]
    Segment { from: Point, to: Point },
    Circle { center: Point, radius: f32 },
    Rectangle { from: Point, to: Point },
    Triangle { p1: Point, p2: Point, p3: Point },
}

impl Geometry {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Geometry::Segment { .. } => ShapeKind::Segment,
            Geometry::Circle { .. } => ShapeKind::Circle,
            Geometry::Rectangle { .. } => ShapeKind::Rectangle,
            Geometry::Triangle { .. } => ShapeKind::Triangle,
        }
    }

    /// Axis-aligned bounding box.
    pub fn bounds(&self) -> Bounds {
        match self {
            Geometry::Segment { from, to } | Geometry::Rectangle { from, to } => {
                Bounds::from_points(&[*from, *to])
            }
            Geometry::Circle { center, radius } => Bounds {
                min_x: center.x - radius,
                min_y: center.y - radius,
                max_x: center.x + radius,
                max_y: center.y + radius,
            },
            Geometry::Triangle { p1, p2, p3 } => Bounds::from_points(&[*p1, *p2, *p3]),
        }
    }

    /// Point hit test.
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Geometry::Segment { from, to } => {
                distance_to_segment(p, *from, *to) <= SEGMENT_HIT_TOLERANCE
            }
            Geometry::Circle { center, radius } => center.distance_to(p) <= *radius,
            Geometry::Rectangle { .. } => self.bounds().contains(p),
            Geometry::Triangle { p1, p2, p3 } => {
                let d1 = edge_sign(p, *p1, *p2);
                let d2 = edge_sign(p, *p2, *p3);
                let d3 = edge_sign(p, *p3, *p1);
                let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
                let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
                !(has_neg && has_pos)
            }
        }
    }
}

fn edge_sign(p: Point, a: Point, b: Point) -> f32 {
    (p.x - b.x) * (a.y - b.y) - (a.x - b.x) * (p.y - b.y)
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Axis-aligned bounding box stored as min/max corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    fn from_points(points: &[Point]) -> Self {
        let mut b = Bounds {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        };
        for p in points {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        b
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// One drawable object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    #[serde(flatten)]
    pub geometry: Geometry,
    pub border_color: String,
    pub fill_color: String,
    /// Live-preview shape during a multi-step draw gesture.
    /// Never selectable, never hit.
    #[serde(default)]
    pub temporary: bool,
}

impl Shape {
    pub fn new(id: impl Into<ShapeId>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            border_color: "#000000".to_string(),
            fill_color: "transparent".to_string(),
            temporary: false,
        }
    }

    pub fn segment(id: impl Into<ShapeId>, from: Point, to: Point) -> Self {
        Self::new(id, Geometry::Segment { from, to })
    }

    pub fn circle(id: impl Into<ShapeId>, center: Point, radius: f32) -> Self {
        Self::new(id, Geometry::Circle { center, radius })
    }

    pub fn rectangle(id: impl Into<ShapeId>, from: Point, to: Point) -> Self {
        Self::new(id, Geometry::Rectangle { from, to })
    }

    pub fn triangle(id: impl Into<ShapeId>, p1: Point, p2: Point, p3: Point) -> Self {
        Self::new(id, Geometry::Triangle { p1, p2, p3 })
    }

    pub fn with_colors(mut self, border: impl Into<String>, fill: impl Into<String>) -> Self {
        self.border_color = border.into();
        self.fill_color = fill.into();
        self
    }

    pub fn into_temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    pub fn bounds(&self) -> Bounds {
        self.geometry.bounds()
    }

    pub fn contains(&self, p: Point) -> bool {
        self.geometry.contains(p)
    }

    /// New value with `patch` applied; the id is kept.
    pub fn patched(&self, patch: &ShapePatch) -> Shape {
        Shape {
            id: self.id.clone(),
            geometry: patch.geometry.clone().unwrap_or_else(|| self.geometry.clone()),
            border_color: patch
                .border_color
                .clone()
                .unwrap_or_else(|| self.border_color.clone()),
            fill_color: patch
                .fill_color
                .clone()
                .unwrap_or_else(|| self.fill_color.clone()),
            temporary: patch.temporary.unwrap_or(self.temporary),
        }
    }
}

/// Partial attributes carried by an update event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary: Option<bool>,
}

impl ShapePatch {
    pub fn is_empty(&self) -> bool {
        self.geometry.is_none()
            && self.border_color.is_none()
            && self.fill_color.is_none()
            && self.temporary.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_generated_id_format() {
        let id = ShapeId::generate(ShapeKind::Rectangle, "abc", 7);
        assert_eq!(id.as_str(), "rect-abc-7");
        let id = ShapeId::generate(ShapeKind::Segment, "abc", 0);
        assert_eq!(id.as_str(), "line-abc-0");
    }

    #[test]
    fn test_shape_json_flattens_geometry() {
        let shape = Shape::rectangle("r1", p(0.0, 0.0), p(10.0, 5.0));
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["type"], "Rectangle");
        assert_eq!(json["id"], "r1");
        assert_eq!(json["borderColor"], "#000000");
        assert_eq!(json["to"]["x"], 10.0);

        let back: Shape = serde_json::from_value(json).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_segment_wire_name_and_alias() {
        let shape = Shape::segment("l1", p(0.0, 0.0), p(1.0, 1.0));
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["type"], "Line");

        let raw = r#"{"id":"l2","type":"Segment","from":{"x":0,"y":0},"to":{"x":2,"y":2},
            "borderColor":"red","fillColor":"blue"}"#;
        let parsed: Shape = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.kind(), ShapeKind::Segment);
        assert!(!parsed.temporary);
    }

    #[test]
    fn test_patch_keeps_id_and_unpatched_fields() {
        let shape = Shape::circle("c1", p(5.0, 5.0), 2.0).with_colors("red", "blue");
        let patch = ShapePatch {
            fill_color: Some("green".to_string()),
            ..ShapePatch::default()
        };
        let updated = shape.patched(&patch);
        assert_eq!(updated.id, shape.id);
        assert_eq!(updated.fill_color, "green");
        assert_eq!(updated.border_color, "red");
        assert_eq!(updated.geometry, shape.geometry);
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = ShapePatch {
            border_color: Some("#fff".to_string()),
            ..ShapePatch::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r##"{"borderColor":"#fff"}"##);
        assert!(ShapePatch::default().is_empty());
    }

    #[test]
    fn test_hit_testing_per_kind() {
        let line = Shape::segment("l", p(0.0, 0.0), p(10.0, 0.0));
        assert!(line.contains(p(5.0, 2.0)));
        assert!(!line.contains(p(5.0, 4.0)));
        assert!(!line.contains(p(14.0, 0.0)));

        let circle = Shape::circle("c", p(0.0, 0.0), 5.0);
        assert!(circle.contains(p(3.0, 4.0)));
        assert!(!circle.contains(p(4.0, 4.0)));

        // Dragged up-left: corners are normalised.
        let rect = Shape::rectangle("r", p(10.0, 10.0), p(0.0, 0.0));
        assert!(rect.contains(p(5.0, 5.0)));
        assert!(!rect.contains(p(11.0, 5.0)));

        let tri = Shape::triangle("t", p(0.0, 0.0), p(10.0, 0.0), p(0.0, 10.0));
        assert!(tri.contains(p(2.0, 2.0)));
        assert!(!tri.contains(p(8.0, 8.0)));
    }

    #[test]
    fn test_bounds() {
        let circle = Shape::circle("c", p(1.0, 1.0), 2.0);
        assert_eq!(
            circle.bounds(),
            Bounds { min_x: -1.0, min_y: -1.0, max_x: 3.0, max_y: 3.0 }
        );
    }
}
