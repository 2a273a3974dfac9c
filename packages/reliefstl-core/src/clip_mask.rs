use geo::{Area, Intersects, Point, Polygon, Validation};
use geo_types::LineString;
use ndarray::{Array2, Zip};

use crate::coords::linspace;
use crate::models::ProjectedBbox;

/// Build a geo polygon from a raw outline ring. Returns `None` for rings
/// that cannot clip anything: fewer than 3 distinct points, zero area, or
/// self-intersecting geometry.
pub fn outline_polygon(outline: &[[f64; 2]]) -> Option<Polygon<f64>> {
    let mut ring: Vec<(f64, f64)> = outline.iter().map(|p| (p[0], p[1])).collect();
    if ring.len() >= 2 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return None;
    }
    let polygon = Polygon::new(LineString::from(ring), vec![]);
    if !polygon.is_valid() || polygon.unsigned_area() <= 0.0 {
        return None;
    }
    Some(polygon)
}

/// Rasterise the outline onto the grid: `true` where the sample point in
/// projected coordinates lies inside the polygon. An unusable outline
/// disables clipping by returning an all-true mask.
pub fn build_clip_mask(
    outline: &[[f64; 2]],
    bbox: &ProjectedBbox,
    rows: usize,
    cols: usize,
) -> Array2<bool> {
    let polygon = match outline_polygon(outline) {
        Some(polygon) => polygon,
        None => return Array2::from_elem((rows, cols), true),
    };
    mask_for_polygon(&polygon, bbox, rows, cols)
}

/// Point-in-polygon over every cell centre, row-parallel.
pub(crate) fn mask_for_polygon(
    polygon: &Polygon<f64>,
    bbox: &ProjectedBbox,
    rows: usize,
    cols: usize,
) -> Array2<bool> {
    let eastings = linspace(bbox.min_e, bbox.max_e, cols);
    // Row 0 is the north edge.
    let northings = linspace(bbox.max_n, bbox.min_n, rows);

    let mut mask = Array2::from_elem((rows, cols), false);
    Zip::indexed(&mut mask).par_for_each(|(r, c), inside| {
        *inside = polygon.intersects(&Point::new(eastings[c], northings[r]));
    });
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> ProjectedBbox {
        ProjectedBbox::new(0.0, 0.0, 100.0, 100.0)
    }

    #[test]
    fn test_short_outline_disables_clipping() {
        let mask = build_clip_mask(&[[0.0, 0.0], [50.0, 50.0]], &bbox(), 8, 8);
        assert!(mask.iter().all(|&v| v));
    }

    #[test]
    fn test_self_intersecting_outline_disables_clipping() {
        // Bowtie.
        let outline = [[0.0, 0.0], [100.0, 100.0], [100.0, 0.0], [0.0, 100.0]];
        let mask = build_clip_mask(&outline, &bbox(), 8, 8);
        assert!(mask.iter().all(|&v| v));
    }

    #[test]
    fn test_closing_duplicate_is_tolerated() {
        let outline = [
            [10.0, 10.0],
            [90.0, 10.0],
            [90.0, 90.0],
            [10.0, 90.0],
            [10.0, 10.0],
        ];
        assert!(outline_polygon(&outline).is_some());
    }

    #[test]
    fn test_mask_marks_interior_samples() {
        // Central square covering the middle of an 11x11 sample grid.
        let outline = [[25.0, 25.0], [75.0, 25.0], [75.0, 75.0], [25.0, 75.0]];
        let mask = build_clip_mask(&outline, &bbox(), 11, 11);
        // Sample (5, 5) sits at (50, 50): inside.
        assert!(mask[[5, 5]]);
        // Corners are well outside.
        assert!(!mask[[0, 0]]);
        assert!(!mask[[10, 10]]);
        // Row 0 is north (northing 100), outside the square.
        assert!(!mask[[0, 5]]);
        let inside_count = mask.iter().filter(|&&v| v).count();
        // Samples at 30..70 on both axes fall inside; boundary samples at
        // 25/75 may land either way.
        assert!(inside_count >= 25 && inside_count <= 49, "{}", inside_count);
    }
}
