use geo::{BoundingRect, Intersects, Point};
use ndarray::Array2;
use tracing::info;

use crate::clip_mask::outline_polygon;
use crate::coords::linspace;
use crate::models::{ProjectedBbox, RoadPolygon};

/// Height added to every cell covered by a road polygon, in model mm.
pub const ROAD_RAISE_MM: f32 = 0.15;

/// Upper bound on the point-in-polygon raster, independent of grid size.
const TARGET_WORK_CELLS: usize = 1_200_000;

/// Raise the height field inside road polygons. The embossing raster is
/// stride-reduced so its cost stays bounded for large grids, then the mask
/// is nearest-neighbour upsampled back onto the full grid. Degenerate or
/// invalid rings are skipped silently.
pub fn apply_road_emboss(
    z: &mut Array2<f32>,
    roads: &[RoadPolygon],
    bbox: &ProjectedBbox,
    raise_mm: f32,
) {
    if roads.is_empty() {
        return;
    }
    let (rows, cols) = z.dim();

    let stride = if rows * cols > TARGET_WORK_CELLS {
        ((rows * cols) as f64 / TARGET_WORK_CELLS as f64).sqrt().ceil() as usize
    } else {
        1
    };
    let work_rows = rows.div_ceil(stride);
    let work_cols = cols.div_ceil(stride);

    let eastings = linspace(bbox.min_e, bbox.max_e, work_cols);
    let northings = linspace(bbox.max_n, bbox.min_n, work_rows);
    let width = bbox.width();
    let height = bbox.height();

    let mut work_mask = Array2::from_elem((work_rows, work_cols), false);
    let mut applied = 0usize;

    for road in roads {
        let Some(polygon) = outline_polygon(&road.ring) else {
            continue;
        };
        let Some(rect) = polygon.bounding_rect() else {
            continue;
        };

        // Translate the polygon AABB into a clamped work-grid window.
        let c0 = (((rect.min().x - bbox.min_e) / width * (work_cols - 1) as f64).floor() as isize)
            .clamp(0, work_cols as isize - 1) as usize;
        let c1 = (((rect.max().x - bbox.min_e) / width * (work_cols - 1) as f64).ceil() as isize)
            .clamp(0, work_cols as isize - 1) as usize;
        let r0 = (((1.0 - (rect.max().y - bbox.min_n) / height) * (work_rows - 1) as f64).floor()
            as isize)
            .clamp(0, work_rows as isize - 1) as usize;
        let r1 = (((1.0 - (rect.min().y - bbox.min_n) / height) * (work_rows - 1) as f64).ceil()
            as isize)
            .clamp(0, work_rows as isize - 1) as usize;
        if c1 < c0 || r1 < r0 {
            continue;
        }

        let mut any = false;
        for r in r0..=r1 {
            for c in c0..=c1 {
                if !work_mask[[r, c]]
                    && polygon.intersects(&Point::new(eastings[c], northings[r]))
                {
                    work_mask[[r, c]] = true;
                    any = true;
                }
            }
        }
        if any {
            applied += 1;
        }
    }

    let mut raised = 0usize;
    for r in 0..rows {
        for c in 0..cols {
            if work_mask[[r / stride, c / stride]] {
                z[[r, c]] += raise_mm;
                raised += 1;
            }
        }
    }

    info!(
        raised_cells = raised,
        polygons = applied,
        stride,
        work_grid = %format!("{}x{}", work_rows, work_cols),
        "road emboss applied"
    );
}
