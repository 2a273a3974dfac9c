use geo::{Intersects, Point, Polygon};
use tracing::{info, warn};

use crate::clip_mask::outline_polygon;
use crate::coords::ModelFrame;
use crate::mesh_repair::{repair_full, FaceSoup, IndexedMesh};
use crate::models::BuildingMesh;

/// Slack around the model footprint when filtering building vertices.
const BOUNDS_MARGIN_MM: f64 = 0.5;

/// Transform the externally fetched building mesh into model mm, drop faces
/// outside the footprint (and outside the clip outline when one is active),
/// compact the vertex set and run the full repair pass. The result is a
/// triangle soup ready to concatenate with the terrain.
pub fn integrate_buildings(
    mesh: &BuildingMesh,
    frame: &ModelFrame,
    clip_outline: Option<&[[f64; 2]]>,
) -> FaceSoup {
    if mesh.is_empty() {
        return FaceSoup::new();
    }
    let clip_polygon: Option<Polygon<f64>> = clip_outline.and_then(outline_polygon);

    let verts_mm: Vec<[f64; 3]> = mesh
        .vertices
        .iter()
        .map(|&[e, n, h]| [frame.x_mm(e), frame.y_mm(n), frame.z_mm(h)])
        .collect();

    let in_bounds: Vec<bool> = mesh
        .vertices
        .iter()
        .zip(&verts_mm)
        .map(|(&[e, n, _], &[x, y, _])| {
            let inside = x >= -BOUNDS_MARGIN_MM
                && x <= frame.model_width_mm + BOUNDS_MARGIN_MM
                && y >= -BOUNDS_MARGIN_MM
                && y <= frame.height_mm + BOUNDS_MARGIN_MM;
            match &clip_polygon {
                Some(polygon) => inside && polygon.intersects(&Point::new(e, n)),
                None => inside,
            }
        })
        .collect();

    let kept: Vec<[u32; 3]> = mesh
        .faces
        .iter()
        .filter(|face| face.iter().all(|&i| in_bounds[i as usize]))
        .copied()
        .collect();
    info!(
        faces_kept = kept.len(),
        faces_total = mesh.faces.len(),
        "building faces within model bounds"
    );
    if kept.is_empty() {
        warn!("no building faces within model bounds");
        return FaceSoup::new();
    }

    // Compact: keep only referenced vertices, ascending original order.
    let mut used = vec![false; verts_mm.len()];
    for face in &kept {
        for &index in face {
            used[index as usize] = true;
        }
    }
    let mut remap = vec![0u32; verts_mm.len()];
    let mut compact: Vec<[f64; 3]> = Vec::new();
    for (old, &is_used) in used.iter().enumerate() {
        if is_used {
            remap[old] = compact.len() as u32;
            compact.push(verts_mm[old]);
        }
    }
    let faces: Vec<[u32; 3]> = kept
        .iter()
        .map(|face| {
            [
                remap[face[0] as usize],
                remap[face[1] as usize],
                remap[face[2] as usize],
            ]
        })
        .collect();

    let mut indexed = IndexedMesh {
        vertices: compact,
        faces,
    };
    let before = indexed.faces.len();
    repair_full(&mut indexed);
    info!(
        faces = indexed.faces.len(),
        from = before,
        verts = indexed.vertices.len(),
        "building mesh repaired"
    );
    indexed.to_soup()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectedBbox;

    fn frame() -> ModelFrame {
        ModelFrame::new(ProjectedBbox::new(0.0, 0.0, 100.0, 100.0), 100.0, 1.0, 2.0, 400.0)
    }

    /// Closed box building spanning the given projected footprint.
    fn box_building(e0: f64, e1: f64, n0: f64, n1: f64, h0: f64, h1: f64) -> BuildingMesh {
        let vertices = vec![
            [e0, n0, h0],
            [e1, n0, h0],
            [e1, n1, h0],
            [e0, n1, h0],
            [e0, n0, h1],
            [e1, n0, h1],
            [e1, n1, h1],
            [e0, n1, h1],
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [3, 0, 4],
            [3, 4, 7],
        ];
        BuildingMesh { vertices, faces }
    }

    #[test]
    fn test_building_inside_survives_with_all_faces() {
        let mesh = box_building(40.0, 60.0, 40.0, 60.0, 405.0, 415.0);
        let soup = integrate_buildings(&mesh, &frame(), None);
        assert_eq!(soup.len(), 12);
    }

    #[test]
    fn test_building_outside_bbox_is_dropped() {
        let mesh = box_building(200.0, 220.0, 40.0, 60.0, 405.0, 415.0);
        let soup = integrate_buildings(&mesh, &frame(), None);
        assert!(soup.is_empty());
    }

    #[test]
    fn test_faces_straddling_bounds_are_dropped() {
        // West half inside, east half far outside: only faces whose three
        // vertices are in bounds survive, and none are in this box.
        let mesh = box_building(90.0, 150.0, 40.0, 60.0, 405.0, 415.0);
        let soup = integrate_buildings(&mesh, &frame(), None);
        assert!(soup.is_empty());
    }

    #[test]
    fn test_clip_outline_filters_buildings() {
        let outline = vec![[0.0, 0.0], [50.0, 0.0], [50.0, 100.0], [0.0, 100.0]];
        let inside = box_building(10.0, 30.0, 40.0, 60.0, 405.0, 415.0);
        let outside = box_building(70.0, 90.0, 40.0, 60.0, 405.0, 415.0);
        assert_eq!(
            integrate_buildings(&inside, &frame(), Some(&outline)).len(),
            12
        );
        assert!(integrate_buildings(&outside, &frame(), Some(&outline)).is_empty());
    }

    #[test]
    fn test_z_mapping_uses_frame_min_elev() {
        let mesh = box_building(40.0, 60.0, 40.0, 60.0, 400.0, 410.0);
        let soup = integrate_buildings(&mesh, &frame(), None);
        let min_z = soup
            .faces
            .iter()
            .flat_map(|t| t.iter())
            .map(|v| v[2])
            .fold(f32::INFINITY, f32::min);
        let max_z = soup
            .faces
            .iter()
            .flat_map(|t| t.iter())
            .map(|v| v[2])
            .fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(min_z, 0.0);
        assert_eq!(max_z, 10.0);
    }

    #[test]
    fn test_duplicate_faces_removed_by_repair() {
        let mut mesh = box_building(40.0, 60.0, 40.0, 60.0, 405.0, 415.0);
        mesh.faces.push([0, 2, 1]);
        mesh.faces.push([1, 0, 2]);
        let soup = integrate_buildings(&mesh, &frame(), None);
        assert_eq!(soup.len(), 12);
    }
}
