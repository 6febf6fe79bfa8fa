//! Document elements and their canonical text encoding.
//!
//! Every shape is fully reconstructible from its encoding (round-trip law):
//! a space-delimited type tag, the type-specific integer fields, and a
//! trailing packed-RGB color. Polylines carry their points as one bracketed
//! token (`[x,y;x,y;...]`) so the variable-length case stays a single field.

use serde::{Deserialize, Serialize};

/// Hit-test slack for segments and polylines, in pixels.
const HIT_TOLERANCE: f64 = 3.0;

/// A point in document coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A document element.
///
/// Rect and Ellipse store their corners normalized (min corner first), so the
/// stored pair is independent of the order the geometry was given in.
/// Segments keep their endpoints as given; polylines hold a non-empty ordered
/// point list. Color is a packed signed 32-bit RGB integer
/// (`-16777216` is opaque black).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Rect {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: i32,
    },
    Ellipse {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: i32,
    },
    Segment {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: i32,
    },
    Polyline {
        points: Vec<Point>,
        color: i32,
    },
}

/// Failure to decode a shape from its token form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    UnknownKind(String),
    /// Wrong number of fields for the kind.
    FieldCount { kind: &'static str, expected: usize, got: usize },
    /// A field that should be an integer was not.
    BadNumber(String),
    /// Polyline point list missing its `[...]` delimiters.
    UndelimitedPoints(String),
    /// Polyline with no points.
    EmptyPointList,
    /// A polyline point token that is not `x,y`.
    BadPoint(String),
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKind(kind) => write!(f, "unknown shape kind {kind:?}"),
            Self::FieldCount { kind, expected, got } => {
                write!(f, "{kind} takes {expected} fields, got {got}")
            }
            Self::BadNumber(token) => write!(f, "expected an integer, got {token:?}"),
            Self::UndelimitedPoints(token) => {
                write!(f, "point list {token:?} is not bracket-delimited")
            }
            Self::EmptyPointList => write!(f, "polyline needs at least one point"),
            Self::BadPoint(token) => write!(f, "expected a point as x,y, got {token:?}"),
        }
    }
}

impl std::error::Error for ShapeError {}

fn parse_i32(token: &str) -> Result<i32, ShapeError> {
    token
        .parse()
        .map_err(|_| ShapeError::BadNumber(token.to_string()))
}

impl Shape {
    /// A rectangle from two corners, stored min/max regardless of argument
    /// order.
    pub fn rect(x1: i32, y1: i32, x2: i32, y2: i32, color: i32) -> Self {
        Self::Rect {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            color,
        }
    }

    /// An ellipse inscribed in the box spanned by two corners, stored min/max.
    pub fn ellipse(x1: i32, y1: i32, x2: i32, y2: i32, color: i32) -> Self {
        Self::Ellipse {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            color,
        }
    }

    /// A line segment. Endpoints are kept in the order given.
    pub fn segment(x1: i32, y1: i32, x2: i32, y2: i32, color: i32) -> Self {
        Self::Segment { x1, y1, x2, y2, color }
    }

    /// A polyline through the given points. Rejects an empty point list.
    pub fn polyline(points: Vec<Point>, color: i32) -> Result<Self, ShapeError> {
        if points.is_empty() {
            return Err(ShapeError::EmptyPointList);
        }
        Ok(Self::Polyline { points, color })
    }

    /// The wire tag for this shape's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rect { .. } => "rect",
            Self::Ellipse { .. } => "ellipse",
            Self::Segment { .. } => "segment",
            Self::Polyline { .. } => "polyline",
        }
    }

    pub fn color(&self) -> i32 {
        match self {
            Self::Rect { color, .. }
            | Self::Ellipse { color, .. }
            | Self::Segment { color, .. }
            | Self::Polyline { color, .. } => *color,
        }
    }

    /// Canonical text encoding: tag, fields, trailing color.
    pub fn encode(&self) -> String {
        match self {
            Self::Rect { x1, y1, x2, y2, color } => {
                format!("rect {x1} {y1} {x2} {y2} {color}")
            }
            Self::Ellipse { x1, y1, x2, y2, color } => {
                format!("ellipse {x1} {y1} {x2} {y2} {color}")
            }
            Self::Segment { x1, y1, x2, y2, color } => {
                format!("segment {x1} {y1} {x2} {y2} {color}")
            }
            Self::Polyline { points, color } => {
                let joined = points
                    .iter()
                    .map(|p| format!("{},{}", p.x, p.y))
                    .collect::<Vec<_>>()
                    .join(";");
                format!("polyline [{joined}] {color}")
            }
        }
    }

    /// Decode a shape from its kind tag and field tokens.
    ///
    /// Validates the token count and integer parseability of every field;
    /// a malformed encoding fails without producing a partial shape.
    pub fn decode(kind: &str, fields: &[&str]) -> Result<Self, ShapeError> {
        match kind {
            "rect" | "ellipse" | "segment" => {
                if fields.len() != 5 {
                    return Err(ShapeError::FieldCount {
                        kind: match kind {
                            "rect" => "rect",
                            "ellipse" => "ellipse",
                            _ => "segment",
                        },
                        expected: 5,
                        got: fields.len(),
                    });
                }
                let x1 = parse_i32(fields[0])?;
                let y1 = parse_i32(fields[1])?;
                let x2 = parse_i32(fields[2])?;
                let y2 = parse_i32(fields[3])?;
                let color = parse_i32(fields[4])?;
                Ok(match kind {
                    "rect" => Self::rect(x1, y1, x2, y2, color),
                    "ellipse" => Self::ellipse(x1, y1, x2, y2, color),
                    _ => Self::segment(x1, y1, x2, y2, color),
                })
            }
            "polyline" => {
                if fields.len() != 2 {
                    return Err(ShapeError::FieldCount {
                        kind: "polyline",
                        expected: 2,
                        got: fields.len(),
                    });
                }
                let list = fields[0];
                let inner = list
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .ok_or_else(|| ShapeError::UndelimitedPoints(list.to_string()))?;
                if inner.is_empty() {
                    return Err(ShapeError::EmptyPointList);
                }
                let mut points = Vec::new();
                for token in inner.split(';') {
                    let (x, y) = token
                        .split_once(',')
                        .ok_or_else(|| ShapeError::BadPoint(token.to_string()))?;
                    points.push(Point::new(parse_i32(x)?, parse_i32(y)?));
                }
                let color = parse_i32(fields[1])?;
                Self::polyline(points, color)
            }
            other => Err(ShapeError::UnknownKind(other.to_string())),
        }
    }

    /// Move the shape by the given displacement.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        match self {
            Self::Rect { x1, y1, x2, y2, .. }
            | Self::Ellipse { x1, y1, x2, y2, .. }
            | Self::Segment { x1, y1, x2, y2, .. } => {
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
            }
            Self::Polyline { points, .. } => {
                for p in points.iter_mut() {
                    p.x += dx;
                    p.y += dy;
                }
            }
        }
    }

    pub fn set_color(&mut self, new_color: i32) {
        match self {
            Self::Rect { color, .. }
            | Self::Ellipse { color, .. }
            | Self::Segment { color, .. }
            | Self::Polyline { color, .. } => *color = new_color,
        }
    }

    /// Geometric containment test, used for topmost-hit lookups.
    ///
    /// Rect bounds are inclusive; segments and polylines count a point within
    /// `HIT_TOLERANCE` of any constituent segment as a hit.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        match self {
            Self::Rect { x1, y1, x2, y2, .. } => {
                x >= *x1 && x <= *x2 && y >= *y1 && y <= *y2
            }
            Self::Ellipse { x1, y1, x2, y2, .. } => {
                let a = f64::from(x2 - x1) / 2.0;
                let b = f64::from(y2 - y1) / 2.0;
                if a <= 0.0 || b <= 0.0 {
                    return false;
                }
                let cx = f64::from(x1 + x2) / 2.0;
                let cy = f64::from(y1 + y2) / 2.0;
                let px = (f64::from(x) - cx) / a;
                let py = (f64::from(y) - cy) / b;
                px * px + py * py <= 1.0
            }
            Self::Segment { x1, y1, x2, y2, .. } => {
                point_segment_distance(
                    f64::from(x),
                    f64::from(y),
                    f64::from(*x1),
                    f64::from(*y1),
                    f64::from(*x2),
                    f64::from(*y2),
                ) <= HIT_TOLERANCE
            }
            Self::Polyline { points, .. } => points.windows(2).any(|pair| {
                point_segment_distance(
                    f64::from(x),
                    f64::from(y),
                    f64::from(pair[0].x),
                    f64::from(pair[0].y),
                    f64::from(pair[1].x),
                    f64::from(pair[1].y),
                ) <= HIT_TOLERANCE
            }),
        }
    }
}

/// Distance from (px, py) to the closest point on the segment (x1, y1)-(x2, y2).
fn point_segment_distance(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((px - x1).powi(2) + (py - y1).powi(2)).sqrt();
    }
    let t = (((px - x1) * dx + (py - y1) * dy) / len2).clamp(0.0, 1.0);
    let cx = x1 + t * dx;
    let cy = y1 + t * dy;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}
