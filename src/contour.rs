//! Contour extraction and hand candidate selection.

use image::GrayImage;
use imageproc::{
    contours::{find_contours, BorderType},
    point::Point,
};

/// The boundary of a connected foreground region, as an ordered, closed sequence of pixel
/// positions.
///
/// The last point is implicitly connected back to the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    points: Vec<Point<i32>>,
}

impl Contour {
    /// Creates a contour from an ordered list of boundary points.
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// Creates a contour from `(x, y)` tuples.
    pub fn from_coords(coords: impl IntoIterator<Item = (i32, i32)>) -> Self {
        Self::new(coords.into_iter().map(|(x, y)| Point::new(x, y)).collect())
    }

    #[inline]
    pub fn points(&self) -> &[Point<i32>] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Computes the signed area enclosed by the contour polygon (shoelace formula).
    ///
    /// The result is positive if the points run clockwise on screen (with Y pointing down).
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points)
    }

    /// Computes the unsigned area enclosed by the contour polygon, in square pixels.
    ///
    /// Since the polygon runs through pixel centers, a filled `w x h` rectangle has an area of
    /// `(w - 1) * (h - 1)`.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }
}

pub(crate) fn signed_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice as f64 / 2.0
}

/// Extracts the outer borders of all top-level foreground regions in `mask`.
///
/// Any non-zero pixel counts as foreground. Holes, and regions nested inside holes, are ignored.
/// Straight horizontal, vertical and diagonal runs are compressed to their end points.
///
/// Contours are returned in the order they are found while scanning the mask row by row.
pub fn find_external(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(compress_runs(&c.points)))
        .collect()
}

/// Drops every point that continues a straight run, keeping only the points where the direction
/// of the boundary changes.
fn compress_runs(points: &[Point<i32>]) -> Vec<Point<i32>> {
    // Consecutive duplicates don't change direction, remove them up front.
    let mut deduped = points.to_vec();
    deduped.dedup();
    while deduped.len() > 1 && deduped.first() == deduped.last() {
        deduped.pop();
    }

    let n = deduped.len();
    if n < 3 {
        return deduped;
    }

    let step = |a: Point<i32>, b: Point<i32>| (b.x - a.x, b.y - a.y);
    (0..n)
        .filter(|&i| {
            let prev = deduped[(i + n - 1) % n];
            let cur = deduped[i];
            let next = deduped[(i + 1) % n];
            step(prev, cur) != step(cur, next)
        })
        .map(|i| deduped[i])
        .collect()
}

/// Picks the contour most likely to be the hand: the largest one whose area lies strictly
/// between `min_area` and `max_area`.
///
/// Returns the index of the selected contour. If several contours share the maximum area, the
/// first one wins. Returns `None` if no contour is within bounds.
pub fn select_hand(contours: &[Contour], min_area: f64, max_area: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, contour) in contours.iter().enumerate() {
        let area = contour.area();
        if area <= min_area || area >= max_area {
            continue;
        }
        if best.map_or(true, |(_, best_area)| area > best_area) {
            best = Some((i, area));
        }
    }

    if let Some((i, area)) = best {
        log::trace!("selected contour {i}/{} (area {area})", contours.len());
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Contour {
        Contour::from_coords([(x, y), (x + w, y), (x + w, y + h), (x, y + h)])
    }

    fn fill(mask: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
        for yy in y..y + h {
            for xx in x..x + w {
                mask.put_pixel(xx, yy, Luma([value]));
            }
        }
    }

    #[test]
    fn area_of_rectangles() {
        let c = rect(0, 0, 40, 50);
        assert_eq!(c.area(), 2000.0);
        assert!(c.signed_area() > 0.0);

        let reversed = Contour::new(c.points().iter().rev().copied().collect());
        assert_eq!(reversed.area(), 2000.0);
        assert!(reversed.signed_area() < 0.0);

        assert_eq!(Contour::from_coords([(0, 0), (5, 5)]).area(), 0.0);
    }

    #[test]
    fn selects_largest_in_bounds() {
        let small = rect(0, 0, 40, 50);
        let large = rect(100, 100, 50, 60);
        assert_eq!(large.area(), 3000.0);

        let contours = [small.clone(), large.clone()];
        assert_eq!(select_hand(&contours, 1000.0, 50000.0), Some(1));
        let contours = [large, small];
        assert_eq!(select_hand(&contours, 1000.0, 50000.0), Some(0));
    }

    #[test]
    fn rejects_out_of_bounds() {
        let tiny = rect(0, 0, 20, 25);
        assert_eq!(tiny.area(), 500.0);
        let huge = rect(0, 0, 200, 300);
        assert_eq!(huge.area(), 60000.0);

        assert_eq!(select_hand(&[tiny.clone()], 1000.0, 50000.0), None);
        assert_eq!(select_hand(&[huge.clone()], 1000.0, 50000.0), None);
        assert_eq!(select_hand(&[tiny, huge], 1000.0, 50000.0), None);
        assert_eq!(select_hand(&[], 1000.0, 50000.0), None);
    }

    #[test]
    fn bounds_are_exclusive() {
        let exact_min = rect(0, 0, 20, 50);
        assert_eq!(exact_min.area(), 1000.0);
        assert_eq!(select_hand(&[exact_min], 1000.0, 50000.0), None);

        let exact_max = rect(0, 0, 200, 250);
        assert_eq!(exact_max.area(), 50000.0);
        assert_eq!(select_hand(&[exact_max], 1000.0, 50000.0), None);
    }

    #[test]
    fn ties_go_to_first() {
        let a = rect(0, 0, 40, 50);
        let b = rect(500, 500, 50, 40);
        assert_eq!(a.area(), b.area());
        assert_eq!(select_hand(&[a, b], 1000.0, 50000.0), Some(0));
    }

    #[test]
    fn compresses_straight_runs() {
        let mut mask = GrayImage::new(40, 30);
        fill(&mut mask, 10, 5, 20, 10, 255);

        let contours = find_external(&mask);
        assert_eq!(contours.len(), 1);

        let mut corners = contours[0]
            .points()
            .iter()
            .map(|p| (p.x, p.y))
            .collect::<Vec<_>>();
        corners.sort();
        assert_eq!(corners, [(10, 5), (10, 14), (29, 5), (29, 14)]);
        assert_eq!(contours[0].area(), 19.0 * 9.0);
    }

    #[test]
    fn ignores_holes_and_nested_regions() {
        let mut mask = GrayImage::new(50, 50);
        fill(&mut mask, 5, 5, 30, 30, 255);
        fill(&mut mask, 10, 10, 20, 20, 0);
        fill(&mut mask, 15, 15, 10, 10, 255);
        fill(&mut mask, 40, 40, 5, 5, 255);

        let contours = find_external(&mask);
        assert_eq!(contours.len(), 2);
        // scan order: the big ring starts on row 5, the small square on row 40
        assert_eq!(contours[0].area(), 29.0 * 29.0);
        assert_eq!(contours[1].area(), 4.0 * 4.0);
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(find_external(&GrayImage::new(20, 20)).is_empty());
    }
}
