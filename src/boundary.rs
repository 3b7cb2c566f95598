//! Outer boundaries of bounded regions in a [`RasterMask`].
//!
//! Contours are traced with marching squares at iso-level 0.5 between pixel
//! centers. Crossings sit on the midpoints of grid edges, saddle cells join
//! diagonal bounded pixels (8-connectivity), and every segment is oriented
//! with the bounded region on its right-hand side in image coordinates.
//! Outer boundaries therefore run clockwise on screen and have a positive
//! [`signed_area`]; hole boundaries come out negative and are dropped.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::math::{Point, closed_length, signed_area, strip_closing_point};
use crate::mask::RasterMask;

/// A closed polygon in image coordinates. The closing edge is implied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCurve {
    points: Vec<Point>,
}

impl BoundaryCurve {
    pub fn new(mut points: Vec<Point>) -> Self {
        strip_closing_point(&mut points);
        BoundaryCurve { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points)
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn perimeter(&self) -> f64 {
        closed_length(&self.points)
    }
}

/// Grid edge holding a contour crossing. `H(x, y)` joins pixels `(x, y)` and
/// `(x + 1, y)`; `V(x, y)` joins `(x, y)` and `(x, y + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Edge {
    H(isize, isize),
    V(isize, isize),
}

impl Edge {
    fn midpoint(self) -> Point {
        match self {
            Edge::H(x, y) => Point::new(x as f64 + 0.5, y as f64),
            Edge::V(x, y) => Point::new(x as f64, y as f64 + 0.5),
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

use Side::*;

/// Directed segments per cell configuration, indexed by
/// `tl << 3 | tr << 2 | br << 1 | bl`.
const SEGMENTS: [&[(Side, Side)]; 16] = [
    &[],
    &[(Left, Bottom)],
    &[(Bottom, Right)],
    &[(Left, Right)],
    &[(Right, Top)],
    &[(Left, Top), (Right, Bottom)],
    &[(Bottom, Top)],
    &[(Left, Top)],
    &[(Top, Left)],
    &[(Top, Bottom)],
    &[(Top, Right), (Bottom, Left)],
    &[(Top, Right)],
    &[(Right, Left)],
    &[(Right, Bottom)],
    &[(Bottom, Left)],
    &[],
];

fn cell_edge(x: isize, y: isize, side: Side) -> Edge {
    match side {
        Top => Edge::H(x, y),
        Right => Edge::V(x + 1, y),
        Bottom => Edge::H(x, y + 1),
        Left => Edge::V(x, y),
    }
}

/// Trace the outer boundary of every bounded component of `mask`.
///
/// Curves are ordered by where tracing first meets them (row-major scan).
/// An all-background mask yields no curves.
pub fn extract(mask: &RasterMask) -> Vec<BoundaryCurve> {
    let width = mask.width() as isize;
    let height = mask.height() as isize;

    let mut next: HashMap<Edge, Edge> = HashMap::new();
    let mut starts: Vec<Edge> = Vec::new();

    // cells straddle the image border so every contour closes
    for y in -1..height {
        for x in -1..width {
            let index = (usize::from(mask.get(x, y)) << 3)
                | (usize::from(mask.get(x + 1, y)) << 2)
                | (usize::from(mask.get(x + 1, y + 1)) << 1)
                | usize::from(mask.get(x, y + 1));
            for &(from, to) in SEGMENTS[index] {
                let from = cell_edge(x, y, from);
                next.insert(from, cell_edge(x, y, to));
                starts.push(from);
            }
        }
    }

    let mut visited: HashSet<Edge> = HashSet::with_capacity(starts.len());
    let mut curves = Vec::new();

    for start in starts {
        if visited.contains(&start) {
            continue;
        }
        let mut points = Vec::new();
        let mut current = start;
        loop {
            if !visited.insert(current) {
                break;
            }
            points.push(current.midpoint());
            match next.get(&current) {
                Some(&edge) if edge != start => current = edge,
                _ => break,
            }
        }

        let curve = BoundaryCurve::new(points);
        if curve.signed_area() > 0.0 {
            curves.push(curve);
        }
    }

    curves
}

/// The curve enclosing the greatest area; the first one wins ties.
pub fn largest(curves: Vec<BoundaryCurve>) -> Option<BoundaryCurve> {
    curves.into_iter().fold(None, |best, curve| match best {
        Some(b) if b.area() >= curve.area() => Some(b),
        _ => Some(curve),
    })
}
