use serde::{Deserialize, Serialize};

/// A point in image coordinates: x grows to the right, y grows downwards,
/// pixel centers sit on integer coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn dist_sq(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn dist(&self, other: Point) -> f64 {
        self.dist_sq(other).sqrt()
    }

    /// Point at parameter `t` on the segment from `self` to `other`.
    pub fn lerp(&self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn cross(&self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }
}

/// Shoelace area of a closed polygon. The closing edge is implied.
///
/// Positive for polygons that run clockwise on screen (y down), which is the
/// orientation the boundary extractor gives outer contours.
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice: f64 = (0..n).map(|i| points[i].cross(points[(i + 1) % n])).sum();
    0.5 * twice
}

/// Length of a closed polyline including the implied closing edge.
pub fn closed_length(points: &[Point]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    (0..n).map(|i| points[i].dist(points[(i + 1) % n])).sum()
}

/// Drop a repeated closing vertex so polygons are stored open.
pub fn strip_closing_point(points: &mut Vec<Point>) {
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
}
