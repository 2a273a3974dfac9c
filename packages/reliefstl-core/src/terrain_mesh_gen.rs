use ndarray::Array2;

use crate::mesh_repair::FaceSoup;

/// Build the terrain solid: top surface, bottom plate and four perimeter
/// walls. Triangle count is fully determined by the grid dimensions, and
/// wall vertices reuse the exact top-edge sample coordinates so vertex
/// merging restores shared edges.
///
/// With a clip mask, a top cell is emitted only when all four of its corner
/// samples are inside; plate and rectangular walls are omitted (the polygon
/// skirt and base take over).
pub fn build_terrain_solid(
    x_axis: &[f32],
    y_axis: &[f32],
    z: &Array2<f32>,
    base_z: f32,
    mask: Option<&Array2<bool>>,
) -> FaceSoup {
    let (rows, cols) = z.dim();
    let mut soup = FaceSoup::new();
    soup.faces.reserve(2 * (rows - 1) * (cols - 1) + 2 + 4 * (rows + cols - 2));

    // Top surface: two triangles per cell, split along the TL-BR diagonal.
    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            if let Some(mask) = mask {
                let keep = mask[[r, c]]
                    && mask[[r + 1, c]]
                    && mask[[r, c + 1]]
                    && mask[[r + 1, c + 1]];
                if !keep {
                    continue;
                }
            }
            let tl = [x_axis[c], y_axis[r], z[[r, c]]];
            let bl = [x_axis[c], y_axis[r + 1], z[[r + 1, c]]];
            let tr = [x_axis[c + 1], y_axis[r], z[[r, c + 1]]];
            let br = [x_axis[c + 1], y_axis[r + 1], z[[r + 1, c + 1]]];
            soup.push([tl, bl, tr]);
            soup.push([tr, bl, br]);
        }
    }

    if mask.is_some() {
        return soup;
    }

    let model_width = x_axis[cols - 1];
    let model_height = y_axis[0];

    // Bottom plate, normal facing down.
    soup.push([
        [0.0, 0.0, base_z],
        [0.0, model_height, base_z],
        [model_width, 0.0, base_z],
    ]);
    soup.push([
        [model_width, 0.0, base_z],
        [0.0, model_height, base_z],
        [model_width, model_height, base_z],
    ]);

    // Perimeter walls. North and east strips take one winding, south and
    // west the flipped one, so every outward normal faces away from the
    // interior.
    for c in 0..cols - 1 {
        wall_quad(
            &mut soup,
            [x_axis[c], y_axis[0], z[[0, c]]],
            [x_axis[c + 1], y_axis[0], z[[0, c + 1]]],
            base_z,
            false,
        );
        wall_quad(
            &mut soup,
            [x_axis[c], y_axis[rows - 1], z[[rows - 1, c]]],
            [x_axis[c + 1], y_axis[rows - 1], z[[rows - 1, c + 1]]],
            base_z,
            true,
        );
    }
    for r in 0..rows - 1 {
        wall_quad(
            &mut soup,
            [x_axis[0], y_axis[r], z[[r, 0]]],
            [x_axis[0], y_axis[r + 1], z[[r + 1, 0]]],
            base_z,
            true,
        );
        wall_quad(
            &mut soup,
            [x_axis[cols - 1], y_axis[r], z[[r, cols - 1]]],
            [x_axis[cols - 1], y_axis[r + 1], z[[r + 1, cols - 1]]],
            base_z,
            false,
        );
    }

    soup
}

fn wall_quad(soup: &mut FaceSoup, p0: [f32; 3], p1: [f32; 3], base_z: f32, flip: bool) {
    let p0b = [p0[0], p0[1], base_z];
    let p1b = [p1[0], p1[1], base_z];
    if flip {
        soup.push([p0, p0b, p1]);
        soup.push([p1, p0b, p1b]);
    } else {
        soup.push([p0, p1, p0b]);
        soup.push([p1, p1b, p0b]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ModelFrame;
    use crate::models::ProjectedBbox;

    fn flat_grid(rows: usize, cols: usize, z_value: f32) -> (Vec<f32>, Vec<f32>, Array2<f32>) {
        let bbox = ProjectedBbox::new(0.0, 0.0, 100.0, 100.0);
        let frame = ModelFrame::new(bbox, 100.0, 1.0, 2.0, 0.0);
        (
            frame.x_axis(cols),
            frame.y_axis(rows),
            Array2::from_elem((rows, cols), z_value),
        )
    }

    #[test]
    fn test_face_count_without_mask() {
        let (x, y, z) = flat_grid(10, 10, 1.0);
        let soup = build_terrain_solid(&x, &y, &z, -2.0, None);
        // 2*(rows-1)*(cols-1) top + 2 bottom + 4 strips of 2*(n-1).
        assert_eq!(soup.len(), 162 + 2 + 72);
    }

    #[test]
    fn test_face_count_rectangular_grid() {
        let (x, y, z) = flat_grid(2, 11, 0.5);
        let soup = build_terrain_solid(&x, &y, &z, -2.0, None);
        let top = 2 * 1 * 10;
        let walls = 2 * (2 * 10) + 2 * (2 * 1);
        assert_eq!(soup.len(), top + 2 + walls);
    }

    #[test]
    fn test_top_normals_point_up() {
        let (x, y, z) = flat_grid(4, 4, 3.0);
        let soup = build_terrain_solid(&x, &y, &z, -2.0, None);
        let top = 2 * 3 * 3;
        for triangle in &soup.faces[..top] {
            let [a, b, c] = triangle;
            let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
            let nz = u[0] * v[1] - u[1] * v[0];
            assert!(nz > 0.0, "top face winding must face +z");
        }
    }

    #[test]
    fn test_mask_keeps_full_corner_cells_only() {
        let (x, y, z) = flat_grid(4, 4, 1.0);
        let mut mask = Array2::from_elem((4, 4), true);
        mask[[0, 0]] = false;
        let soup = build_terrain_solid(&x, &y, &z, -2.0, Some(&mask));
        // One cell loses its corner sample: 2*(9 - 1) faces, no plate, no walls.
        assert_eq!(soup.len(), 16);
    }

    #[test]
    fn test_mask_suppresses_plate_and_walls() {
        let (x, y, z) = flat_grid(4, 4, 1.0);
        let mask = Array2::from_elem((4, 4), true);
        let soup = build_terrain_solid(&x, &y, &z, -2.0, Some(&mask));
        assert_eq!(soup.len(), 2 * 3 * 3);
        assert!(soup.faces.iter().all(|t| t.iter().all(|v| v[2] >= 0.0)));
    }

    #[test]
    fn test_wall_vertices_reuse_top_edge_samples() {
        let (x, y, mut z) = flat_grid(3, 3, 0.0);
        z[[0, 1]] = 7.25;
        let soup = build_terrain_solid(&x, &y, &z, -2.0, None);
        let found = soup
            .faces
            .iter()
            .flat_map(|t| t.iter())
            .filter(|v| v[2] == 7.25)
            .count();
        // Sample (0, 1) appears in top faces and in the north wall strip.
        assert!(found >= 4, "shared edge sample missing, found {}", found);
    }
}
