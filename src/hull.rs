//! Convex hull and convexity defect analysis of a contour.
//!
//! Defect depths are plain distances in pixels.

use std::collections::HashMap;

use imageproc::{geometry::convex_hull, point::Point};
use itertools::Itertools;
use nalgebra::Vector2;

use crate::contour::{self, Contour};

/// The convex hull of a [`Contour`], stored as indices into the contour's point list.
///
/// Indices are sorted in ascending order, so the hull visits its vertices in the same direction
/// as the contour itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvexHull {
    indices: Vec<usize>,
}

impl ConvexHull {
    /// Computes the convex hull of `contour`.
    ///
    /// When a hull vertex appears multiple times in the contour, its first occurrence is used.
    pub fn of(contour: &Contour) -> Self {
        let points = contour.points();
        if points.is_empty() {
            return Self {
                indices: Vec::new(),
            };
        }

        let mut first_index = HashMap::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            first_index.entry((p.x, p.y)).or_insert(i);
        }

        let mut indices = convex_hull(points)
            .iter()
            .filter_map(|p| first_index.get(&(p.x, p.y)).copied())
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices.dedup();

        Self { indices }
    }

    /// Returns the hull vertices as indices into the contour they were computed from.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns the hull vertices as points, ordered clockwise on screen.
    ///
    /// `contour` must be the contour this hull was computed from.
    pub fn points_clockwise(&self, contour: &Contour) -> Vec<Point<i32>> {
        let mut points = self
            .indices
            .iter()
            .map(|&i| contour.points()[i])
            .collect::<Vec<_>>();
        // With Y pointing down, a positive shoelace sum means clockwise.
        if contour::signed_area(&points) < 0.0 {
            points.reverse();
        }
        points
    }
}

/// A place where a contour recedes from its convex hull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Defect {
    /// Contour index of the hull vertex where the defect starts.
    pub start: usize,
    /// Contour index of the hull vertex where the defect ends.
    pub end: usize,
    /// Contour index of the point farthest away from the hull edge `start..end`.
    pub farthest: usize,
    /// Distance of `farthest` from the line through the hull edge, in pixels.
    pub depth: f32,
}

/// Computes the convexity defects between `contour` and its convex `hull`.
///
/// For each hull edge, the contour points between the edge's two vertices are scanned and the
/// one farthest away from the edge is reported as a [`Defect`]. Edges that skip no contour points
/// (or where every skipped point lies on the edge) produce no defect.
///
/// Hulls with fewer than 3 vertices have no defects.
pub fn convexity_defects(contour: &Contour, hull: &ConvexHull) -> Vec<Defect> {
    let points = contour.points();
    if hull.len() < 3 || points.len() < 3 {
        return Vec::new();
    }

    let to_vec = |p: Point<i32>| Vector2::new(p.x as f32, p.y as f32);

    let mut defects = Vec::new();
    for (start, end) in hull.indices().iter().copied().circular_tuple_windows() {
        let p0 = to_vec(points[start]);
        let edge = to_vec(points[end]) - p0;
        let edge_len = edge.norm();
        let scale = if edge_len == 0.0 { 0.0 } else { 1.0 / edge_len };

        let mut deepest: Option<(usize, f32)> = None;
        let mut j = start;
        loop {
            j = (j + 1) % points.len();
            if j == end {
                break;
            }
            let d = to_vec(points[j]) - p0;
            // distance to the line through the edge: |edge x d| / |edge|
            let dist = edge.perp(&d).abs() * scale;
            if dist > deepest.map_or(0.0, |(_, depth)| depth) {
                deepest = Some((j, dist));
            }
        }

        if let Some((farthest, dist)) = deepest {
            defects.push(Defect {
                start,
                end,
                farthest,
                depth: dist,
            });
        }
    }
    defects
}
