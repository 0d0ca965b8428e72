//! Shared 2-D geometry: points, rectangles, closed polygons and the mapping
//! between on-screen (display) coordinates and canvas backing-store pixels.
//!
//! Every zone coordinate the backend stores is in backing-store space, i.e.
//! the native pixel grid of the video frame. Clicks arrive in display space
//! and must go through [`to_canvas_space`] before they are kept.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest vertex count accepted for a zone polygon.
pub const MIN_POLYGON_POINTS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("polygon needs at least {MIN_POLYGON_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("display area has zero size")]
    EmptyDisplay,
    #[error("backing store has zero size")]
    EmptyBacking,
}

/// A point in canvas (backing-store) pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Integral pixel dimensions of a backing store or decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Fractional on-screen dimensions (the element's laid-out size).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extent {
    pub width: f32,
    pub height: f32,
}

impl Extent {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Map an on-screen click into backing-store pixels: `(x·W/w, y·H/h)`.
pub fn to_canvas_space(click: Point, display: Extent, backing: Size) -> Result<Point, GeometryError> {
    if display.is_empty() {
        return Err(GeometryError::EmptyDisplay);
    }
    if backing.is_empty() {
        return Err(GeometryError::EmptyBacking);
    }
    Ok(Point {
        x: click.x * backing.width as f32 / display.width,
        y: click.y * backing.height as f32 / display.height,
    })
}

/// Inverse of [`to_canvas_space`], for placing stored coordinates on screen.
pub fn to_display_space(point: Point, display: Extent, backing: Size) -> Result<Point, GeometryError> {
    if display.is_empty() {
        return Err(GeometryError::EmptyDisplay);
    }
    if backing.is_empty() {
        return Err(GeometryError::EmptyBacking);
    }
    Ok(Point {
        x: point.x * display.width / backing.width as f32,
        y: point.y * display.height / backing.height as f32,
    })
}

/// Axis-aligned rectangle in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from edge coordinates, normalising swapped edges.
    pub fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let (l, r) = if left <= right { (left, right) } else { (right, left) };
        let (t, b) = if top <= bottom { (top, bottom) } else { (bottom, top) };
        Self {
            x: l,
            y: t,
            width: r - l,
            height: b - t,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Average of the vertices. Zone labels are placed here.
pub fn vertex_centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Reject point lists that cannot form a polygon.
pub fn ensure_polygon(points: &[Point]) -> Result<(), GeometryError> {
    if points.len() < MIN_POLYGON_POINTS {
        return Err(GeometryError::TooFewPoints(points.len()));
    }
    Ok(())
}

/// A closed polygon; the last vertex is implicitly joined to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Result<Self, GeometryError> {
        ensure_polygon(&points)?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    pub fn centroid(&self) -> Point {
        // Non-empty by construction.
        vertex_centroid(&self.points).unwrap_or_default()
    }

    /// Even-odd ray casting test.
    pub fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    pub fn bounds(&self) -> Rect {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect::from_edges(min_x, min_y, max_x, max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Polygon {
        Polygon::new(vec![
            Point::new(10.0, 10.0),
            Point::new(50.0, 10.0),
            Point::new(50.0, 50.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_click_maps_by_backing_ratio() {
        // 640x480 frame shown at 320x240
        let p = to_canvas_space(
            Point::new(100.0, 60.0),
            Extent::new(320.0, 240.0),
            Size::new(640, 480),
        )
        .unwrap();
        assert_eq!(p, Point::new(200.0, 120.0));
    }

    #[test]
    fn test_click_maps_non_uniform_scale() {
        let p = to_canvas_space(
            Point::new(30.0, 30.0),
            Extent::new(300.0, 100.0),
            Size::new(600, 400),
        )
        .unwrap();
        assert!((p.x - 60.0).abs() < 1e-4);
        assert!((p.y - 120.0).abs() < 1e-4);
    }

    #[test]
    fn test_display_roundtrip() {
        let display = Extent::new(812.5, 457.0);
        let backing = Size::new(1280, 720);
        let click = Point::new(401.0, 233.5);
        let canvas = to_canvas_space(click, display, backing).unwrap();
        let back = to_display_space(canvas, display, backing).unwrap();
        assert!((back.x - click.x).abs() < 1e-3);
        assert!((back.y - click.y).abs() < 1e-3);
    }

    #[test]
    fn test_zero_display_rejected() {
        let err = to_canvas_space(Point::new(1.0, 1.0), Extent::new(0.0, 10.0), Size::new(10, 10));
        assert_eq!(err, Err(GeometryError::EmptyDisplay));
        let err = to_canvas_space(Point::new(1.0, 1.0), Extent::new(10.0, 10.0), Size::new(0, 10));
        assert_eq!(err, Err(GeometryError::EmptyBacking));
    }

    #[test]
    fn test_polygon_requires_three_points() {
        let err = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert_eq!(err, Err(GeometryError::TooFewPoints(2)));
        assert!(Polygon::new(Vec::new()).is_err());
    }

    #[test]
    fn test_polygon_contains() {
        let t = triangle();
        assert!(t.contains(Point::new(45.0, 20.0)));
        assert!(!t.contains(Point::new(15.0, 45.0)));
        assert!(!t.contains(Point::new(100.0, 100.0)));
    }

    #[test]
    fn test_centroid_is_vertex_average() {
        let c = triangle().centroid();
        assert!((c.x - 110.0 / 3.0).abs() < 1e-4);
        assert!((c.y - 70.0 / 3.0).abs() < 1e-4);
        assert_eq!(vertex_centroid(&[]), None);
    }

    #[test]
    fn test_rect_from_swapped_edges() {
        let r = Rect::from_edges(50.0, 50.0, 5.0, 5.0);
        assert_eq!(r, Rect::new(5.0, 5.0, 45.0, 45.0));
        assert_eq!(r.center(), Point::new(27.5, 27.5));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(triangle().bounds(), Rect::new(10.0, 10.0, 40.0, 40.0));
    }
}
