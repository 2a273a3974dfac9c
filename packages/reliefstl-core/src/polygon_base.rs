use ndarray::Array2;

use crate::coords::ModelFrame;
use crate::mesh_repair::FaceSoup;

/// Vertical skirt along the clip outline: each outline vertex is lifted from
/// the base level to the terrain height sampled at its grid cell, two
/// triangles per outline edge. Winding assumes the counter-clockwise ring
/// produced by `clean_ring`, so normals face away from the interior.
pub fn build_polygon_skirt(outline: &[[f64; 2]], frame: &ModelFrame, z: &Array2<f32>) -> FaceSoup {
    let mut soup = FaceSoup::new();
    let Some(ring) = clean_ring(outline) else {
        return soup;
    };
    let (rows, cols) = z.dim();
    let base_z = frame.base_z as f32;

    let lifted: Vec<([f32; 3], [f32; 3])> = ring
        .iter()
        .map(|&[e, n]| {
            let x = frame.x_mm(e) as f32;
            let y = frame.y_mm(n) as f32;
            let top = z[[frame.row_at(n, rows), frame.col_at(e, cols)]];
            ([x, y, base_z], [x, y, top])
        })
        .collect();

    for i in 0..lifted.len() {
        let (a0, t0) = lifted[i];
        let (a1, t1) = lifted[(i + 1) % lifted.len()];
        soup.push([a0, a1, t1]);
        soup.push([a0, t1, t0]);
    }
    soup
}

/// Planar base filling the outline interior at the base level, triangulated
/// by ear clipping. Winding is forced downward (-z).
pub fn build_polygon_base(outline: &[[f64; 2]], frame: &ModelFrame) -> FaceSoup {
    let mut soup = FaceSoup::new();
    let Some(ring) = clean_ring(outline) else {
        return soup;
    };

    let points: Vec<[f32; 2]> = ring
        .iter()
        .map(|&[e, n]| [frame.x_mm(e) as f32, frame.y_mm(n) as f32])
        .collect();
    let flat: Vec<f64> = points
        .iter()
        .flat_map(|p| [p[0] as f64, p[1] as f64])
        .collect();

    let holes: Vec<usize> = Vec::new();
    let Ok(indices) = earcutr::earcut(&flat, &holes, 2) else {
        return soup;
    };

    let base_z = frame.base_z as f32;
    for triple in indices.chunks_exact(3) {
        let a = points[triple[0]];
        let b = points[triple[1]];
        let c = points[triple[2]];
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        let (b, c) = if cross > 0.0 { (c, b) } else { (b, c) };
        soup.push([
            [a[0], a[1], base_z],
            [b[0], b[1], base_z],
            [c[0], c[1], base_z],
        ]);
    }
    soup
}

/// Strip a closing duplicate vertex and force counter-clockwise orientation.
/// Returns `None` for rings that cannot bound an area.
fn clean_ring(outline: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    let mut ring: Vec<[f64; 2]> = outline.to_vec();
    if ring.len() >= 2 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return None;
    }
    let mut doubled_area = 0.0;
    for i in 0..ring.len() {
        let [x0, y0] = ring[i];
        let [x1, y1] = ring[(i + 1) % ring.len()];
        doubled_area += x0 * y1 - x1 * y0;
    }
    if doubled_area == 0.0 {
        return None;
    }
    if doubled_area < 0.0 {
        ring.reverse();
    }
    Some(ring)
}
